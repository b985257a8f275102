//! Core type definitions: tenant ids, device identities, ledger rows,
//! and the parsed client submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::FraudFlag;

/// Company identifier (top tenant level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub uuid::Uuid);

impl CompanyId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Game identifier (one title within a company).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub uuid::Uuid);

impl GameId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device identity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub uuid::Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger row identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub uuid::Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One publisher. Provisioning is out of scope; rows are seeded externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One game title, authenticated by a shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub company_id: CompanyId,
    pub name: String,
    pub game_secret: String,
    pub created_at: DateTime<Utc>,
}

/// One physical device/player within one game.
///
/// Carries two independent device identifiers (conceptually IFA/IFV) that are
/// reconciled on every submission, and the write-once fraud flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub game_id: GameId,
    pub company_id: CompanyId,
    pub device_id_a: String,
    pub device_id_b: String,
    pub created_at: DateTime<Utc>,
    pub cheat: Option<FraudFlag>,
}

impl Identity {
    pub fn is_flagged(&self) -> bool {
        self.cheat.is_some()
    }
}

/// One purchase-verification attempt.
///
/// Unique per (game_id, xact_id, submission_uuid): resubmitting the same
/// attempt resolves to the same row, while a replay under a fresh submission
/// uuid creates a sibling row. `verdict` stays `None` until the engine
/// decides, and undecided rows are the reconciler's work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub company_id: CompanyId,
    pub game_id: GameId,
    pub identity_id: Option<IdentityId>,
    pub xact_id: String,
    pub submission_uuid: String,
    pub created_at: DateTime<Utc>,
    pub client_payload: Option<serde_json::Value>,
    pub platform_response: Option<serde_json::Value>,
    pub platform_status: Option<i64>,
    pub verdict: Option<crate::domain::Verdict>,
}

impl Transaction {
    /// Platform statuses that count as a trusted prior answer: 0 is a valid
    /// receipt, 21007/21008 are the environment-mismatch informational codes.
    pub fn has_trusted_platform_answer(&self) -> bool {
        matches!(self.platform_status, Some(0) | Some(21007) | Some(21008))
    }
}

/// Parsed client submission, after transport framing is stripped.
///
/// `raw` keeps the full payload; clients are encouraged to attach device and
/// playtime context, and all of it lands in the ledger verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub device_id_a: String,
    pub device_id_b: String,
    pub receipt: String,
    pub xact_id: String,
    pub submission_uuid: String,
    pub bundle_id: String,
    pub bundle_version: String,
    #[serde(skip)]
    pub raw: serde_json::Value,
}
