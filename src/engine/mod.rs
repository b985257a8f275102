//! Verification engine: the decision procedure for submitted purchases.
//!
//! Given a ledger row and the identity that submitted it, the engine decides
//! one of the closed set of verdicts, or reports [`Outcome::Undecided`] when
//! the platform could not be reached. Undecided is a first-class outcome, not
//! an error: the caller commits whatever was already persisted and the
//! backlog reconciler retries the row later.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{FraudFlag, Game, Identity, Submission, Transaction, Verdict};
use crate::infra::{IdentityStore, Result, TransactionLedger, VerifyError};
use crate::platform::{PlatformAnswer, PlatformVerifier};

/// Result of one verification attempt.
///
/// `Undecided` means the platform call failed transiently; the transaction
/// keeps a NULL verdict and no fraud state is touched. Callers must never
/// treat it as "invalid".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Decided(Verdict),
    Undecided,
}

impl Outcome {
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Outcome::Decided(v) => Some(*v),
            Outcome::Undecided => None,
        }
    }
}

/// Everything the request path learns about one submission.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub identity: Identity,
    pub transaction: Transaction,
    pub outcome: Outcome,
}

/// The decision procedure plus the full submission flow around it.
pub struct VerificationEngine {
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn TransactionLedger>,
    platform: Arc<dyn PlatformVerifier>,
}

impl VerificationEngine {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn TransactionLedger>,
        platform: Arc<dyn PlatformVerifier>,
    ) -> Self {
        Self {
            identities,
            ledger,
            platform,
        }
    }

    /// Full submission flow: resolve the identity, record the transaction,
    /// verify. Store errors propagate; platform transience does not.
    pub async fn submit(&self, game: &Game, submission: &Submission) -> Result<SubmissionRecord> {
        let identity = self
            .identities
            .resolve_or_create(game, &submission.device_id_a, &submission.device_id_b)
            .await?;

        let transaction = self.ledger.get_or_create(game, &identity, submission).await?;
        let outcome = self.verify(&transaction, &identity).await?;

        Ok(SubmissionRecord {
            identity,
            transaction,
            outcome,
        })
    }

    /// Decision procedure, evaluated in precedence order, short-circuiting
    /// on the first match.
    ///
    /// `submitting` is the identity derived from the current request (or the
    /// recorded owner when the reconciler re-runs a row).
    pub async fn verify(&self, xact: &Transaction, submitting: &Identity) -> Result<Outcome> {
        // 1. A different identity passing in someone else's transaction.
        //    Exceedingly common in the wild; the flag lands on the submitter,
        //    never on the legitimate owner.
        if xact.identity_id != Some(submitting.id) {
            return self
                .decide(xact, Verdict::InvalidUser, Some(submitting))
                .await;
        }

        // 2. The owning identity belongs to a different game.
        if xact.game_id != submitting.game_id {
            return self
                .decide(xact, Verdict::InvalidGame, Some(submitting))
                .await;
        }

        // Decisions are final; a fully processed row is not recomputed.
        if let Some(verdict) = xact.verdict {
            return Ok(Outcome::Decided(verdict));
        }

        // 3. Receipt replay: the same purchase resubmitted under a fresh
        //    client-generated submission uuid. The sibling's platform answer
        //    is copied verbatim onto this row.
        if let Some(sibling) = self
            .ledger
            .sibling_with_response(xact.game_id, &xact.xact_id, &xact.submission_uuid)
            .await?
        {
            if let (Some(status), Some(response)) =
                (sibling.platform_status, sibling.platform_response.as_ref())
            {
                self.ledger
                    .record_platform_answer(xact.id, status, response)
                    .await?;
            }
            return self
                .decide(xact, Verdict::DuplicateIap, Some(submitting))
                .await;
        }

        // 4. Ask the platform, unless a trusted answer is already stored.
        let answer = if xact.has_trusted_platform_answer() {
            PlatformAnswer {
                status: xact.platform_status.unwrap_or_default(),
                body: xact.platform_response.clone().unwrap_or_default(),
            }
        } else {
            let receipt = receipt_from_payload(xact)?;
            match self.platform.verify(&receipt).await {
                Ok(answer) => {
                    self.ledger
                        .record_platform_answer(xact.id, answer.status, &answer.body)
                        .await?;
                    answer
                }
                Err(e) => {
                    // Transient by contract: leave the verdict unset and let
                    // the reconciler swing back by.
                    debug!(
                        xact_id = %xact.xact_id,
                        error = %e,
                        "platform verification unavailable, leaving transaction undecided"
                    );
                    return Ok(Outcome::Undecided);
                }
            }
        };

        // 5. Final verdict from the platform answer.
        if answer.status != 0 {
            return self
                .decide(xact, Verdict::InvalidReceipt, Some(submitting))
                .await;
        }

        let declared = declared_bundle_id(xact)?;
        if answer.bundle_id() != Some(declared.as_str()) {
            return self
                .decide(xact, Verdict::InvalidBundle, Some(submitting))
                .await;
        }

        self.decide(xact, Verdict::Valid, None).await
    }

    /// Commit a verdict: write it onto the row (only if still undecided) and
    /// arm the fraud flag on the given identity for non-valid verdicts.
    async fn decide(
        &self,
        xact: &Transaction,
        verdict: Verdict,
        flagged: Option<&Identity>,
    ) -> Result<Outcome> {
        let newly_set = self.ledger.set_verdict(xact.id, verdict).await?;

        if verdict.is_fraud() {
            if let Some(identity) = flagged {
                let armed = self
                    .identities
                    .arm_fraud_flag(
                        identity.id,
                        FraudFlag {
                            kind: verdict,
                            at: Utc::now(),
                        },
                    )
                    .await?;
                if armed {
                    warn!(
                        identity_id = %identity.id,
                        xact_id = %xact.xact_id,
                        verdict = %verdict,
                        "fraud flag armed"
                    );
                }
            }
        }

        if newly_set {
            info!(xact_id = %xact.xact_id, verdict = %verdict, "transaction decided");
        }

        Ok(Outcome::Decided(verdict))
    }
}

fn receipt_from_payload(xact: &Transaction) -> Result<String> {
    xact.client_payload
        .as_ref()
        .and_then(|p| p.get("receipt"))
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            VerifyError::MalformedPayload(format!(
                "transaction {} has no stored receipt",
                xact.xact_id
            ))
        })
}

fn declared_bundle_id(xact: &Transaction) -> Result<String> {
    xact.client_payload
        .as_ref()
        .and_then(|p| p.get("bundle_id"))
        .and_then(|b| b.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            VerifyError::MalformedPayload(format!(
                "transaction {} has no declared bundle id",
                xact.xact_id
            ))
        })
}
