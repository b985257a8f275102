//! Domain types for the verification service.
//!
//! - [`status`] - verdict taxonomy and the write-once fraud flag
//! - [`types`] - tenant ids, identities, ledger rows, submissions

mod status;
mod types;

pub use status::{FraudFlag, Verdict};
pub use types::{
    Company, CompanyId, Game, GameId, Identity, IdentityId, Submission, Transaction, TransactionId,
};
