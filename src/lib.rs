//! iap-sentry
//!
//! Multi-tenant in-app-purchase receipt verification: decides whether each
//! submitted purchase is authentic and attributable to a single legitimate
//! device, arms write-once fraud flags on the owning identity, and reconciles
//! transactions the platform could not answer synchronously.
//!
//! ## Modules
//!
//! - [`domain`] - verdict taxonomy, tenant ids, identities, ledger rows
//! - [`infra`] - store traits and the SQLite implementation
//! - [`platform`] - App Store verification adapter (production/sandbox)
//! - [`engine`] - the verification decision procedure
//! - [`reconciler`] - backlog sweep for undecided transactions
//! - [`api`] - submission endpoint
//! - [`server`] - HTTP server bootstrap

pub mod api;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod migrations;
pub mod platform;
pub mod reconciler;
pub mod server;

// Re-export commonly used types
pub use domain::{
    Company, CompanyId, FraudFlag, Game, GameId, Identity, IdentityId, Submission, Transaction,
    TransactionId, Verdict,
};
pub use engine::{Outcome, SubmissionRecord, VerificationEngine};
pub use infra::{
    IdentityStore, Result, SqliteStore, TenantStore, TransactionLedger, VerifyError,
};
pub use platform::{AppStoreClient, AppStoreConfig, PlatformAnswer, PlatformError, PlatformVerifier};
pub use reconciler::{Reconciler, ReconcilerConfig, SweepReport};
