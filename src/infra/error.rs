//! Error types for the verification infrastructure.

use thiserror::Error;

/// Errors that can occur in the verification core.
///
/// Transient platform failures are deliberately not represented here; the
/// adapter has its own error type and the engine maps it to an undecided
/// outcome instead of propagating it.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No game matches the submitted shared secret
    #[error("unknown game secret")]
    UnknownGame,

    /// Identity not found
    #[error("identity not found: {0}")]
    IdentityNotFound(uuid::Uuid),

    /// Client payload missing or malformed
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
