//! Infrastructure layer: store traits, errors, and the SQLite implementation.

mod error;
pub mod sqlite;
mod traits;

pub use error::{Result, VerifyError};
pub use sqlite::SqliteStore;
pub use traits::*;
