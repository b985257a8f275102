//! SQLite-backed durable store.

mod store;

pub use store::SqliteStore;
