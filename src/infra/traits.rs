//! Trait definitions for the verification core's durable store.
//!
//! The durable store is the single shared mutable resource; every component
//! takes these traits rather than a concrete pool so the engine can be
//! exercised against mocks.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    Company, CompanyId, FraudFlag, Game, GameId, Identity, IdentityId, Submission, Transaction,
    TransactionId, Verdict,
};

use super::Result;

/// Tenant lookup. Games authenticate by shared secret; provisioning proper is
/// out of scope, but seeding is exposed for bootstrap tooling and tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Resolve a game by its shared secret. `None` means a client error, not
    /// a verification failure.
    async fn game_by_secret(&self, game_secret: &str) -> Result<Option<Game>>;

    async fn create_company(&self, name: &str) -> Result<Company>;

    async fn create_game(
        &self,
        company_id: CompanyId,
        name: &str,
        game_secret: &str,
    ) -> Result<Game>;
}

/// Device-identity resolution and the write-once fraud flag.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find the identity a submission belongs to, reconciling the two device
    /// identifiers, or create a new one scoped to the game.
    ///
    /// Lookup order: `device_id_b` first (updating a drifted `device_id_a`),
    /// then `device_id_a` (updating a drifted `device_id_b`). Concurrent
    /// first submissions for a genuinely new device may race to create two
    /// identities; that is a documented limitation, not retried here.
    async fn resolve_or_create(
        &self,
        game: &Game,
        device_id_a: &str,
        device_id_b: &str,
    ) -> Result<Identity>;

    async fn get(&self, id: IdentityId) -> Result<Option<Identity>>;

    /// Arm the fraud flag, compare-and-set: writes only if no flag is set.
    /// Returns whether this call armed it (first detection wins).
    async fn arm_fraud_flag(&self, id: IdentityId, flag: FraudFlag) -> Result<bool>;
}

/// Durable, deduplicated record of purchase attempts and their verdicts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Fetch or create the row for (game, xact_id, submission_uuid).
    ///
    /// Atomic with respect to the uniqueness invariant: the loser of a
    /// concurrent first-submission race observes the winner's row. Identity,
    /// payload, and creation time are set once and never overwritten by
    /// later submissions.
    async fn get_or_create(
        &self,
        game: &Game,
        identity: &Identity,
        submission: &Submission,
    ) -> Result<Transaction>;

    async fn read_by_id(&self, id: TransactionId) -> Result<Option<Transaction>>;

    async fn get_by_submission(
        &self,
        game_id: GameId,
        xact_id: &str,
        submission_uuid: &str,
    ) -> Result<Option<Transaction>>;

    /// A row for the same purchase under a different submission uuid that
    /// already carries a platform response, if any. Receipt replay detection.
    async fn sibling_with_response(
        &self,
        game_id: GameId,
        xact_id: &str,
        submission_uuid: &str,
    ) -> Result<Option<Transaction>>;

    /// Persist the raw platform status and response body on a row.
    async fn record_platform_answer(
        &self,
        id: TransactionId,
        status: i64,
        response: &serde_json::Value,
    ) -> Result<()>;

    /// Set the verdict, only if the row is still undecided. Returns whether
    /// this call decided it (decisions are final).
    async fn set_verdict(&self, id: TransactionId, verdict: Verdict) -> Result<bool>;

    /// Undecided rows, oldest first. The reconciler's work queue.
    async fn list_undecided(&self, limit: u32) -> Result<Vec<Transaction>>;

    async fn undecided_count(&self) -> Result<u64>;
}
