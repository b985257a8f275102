//! Backlog reconciler.
//!
//! Background service that re-attempts verification for transactions left
//! undecided by platform timeouts. Each row is committed independently so a
//! failure in one cannot block the rest of the sweep. When the backlog stays
//! above the alarm threshold after a sweep, the report carries an advisory
//! "processing is falling behind" signal for the operator; the sweep itself
//! still succeeds.
//!
//! # Configuration
//!
//! - `RECONCILE_INTERVAL_SECS` - how often to sweep (default: 60)
//! - `RECONCILE_SWEEP_LIMIT` - max rows per sweep (default: 500)

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::domain::Transaction;
use crate::engine::{Outcome, VerificationEngine};
use crate::infra::{IdentityStore, Result, TransactionLedger};

/// Undecided rows tolerated after a sweep before the alarm trips.
pub const BACKLOG_ALARM_THRESHOLD: u64 = 10;

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often to sweep undecided transactions.
    pub sweep_interval: Duration,
    /// Maximum rows re-verified per sweep.
    pub sweep_limit: u32,
    /// Backlog size above which the advisory alarm trips.
    pub backlog_threshold: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            sweep_limit: 500,
            backlog_threshold: BACKLOG_ALARM_THRESHOLD,
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let sweep_interval = std::env::var("RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        let sweep_limit = std::env::var("RECONCILE_SWEEP_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        Self {
            sweep_interval,
            sweep_limit,
            backlog_threshold: BACKLOG_ALARM_THRESHOLD,
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Rows picked up by this sweep.
    pub swept: usize,
    /// Rows that reached a terminal verdict.
    pub decided: usize,
    /// Rows that errored and were skipped.
    pub failed: usize,
    /// Undecided rows remaining after the sweep.
    pub backlog: u64,
    threshold: u64,
}

impl SweepReport {
    /// Advisory alarm: verification is falling behind.
    pub fn backlog_exceeded(&self) -> bool {
        self.backlog > self.threshold
    }
}

/// Message types for reconciler control.
#[derive(Debug)]
pub enum ReconcilerMessage {
    /// Run a sweep immediately.
    SweepNow,
    /// Shut the reconciler down.
    Shutdown,
}

/// Periodically re-verifies undecided transactions.
pub struct Reconciler {
    config: ReconcilerConfig,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn TransactionLedger>,
    engine: Arc<VerificationEngine>,
    control_tx: mpsc::Sender<ReconcilerMessage>,
    control_rx: mpsc::Receiver<ReconcilerMessage>,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn TransactionLedger>,
        engine: Arc<VerificationEngine>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            config,
            identities,
            ledger,
            engine,
            control_tx,
            control_rx,
        }
    }

    /// Get a sender handle for controlling the reconciler.
    pub fn control_handle(&self) -> mpsc::Sender<ReconcilerMessage> {
        self.control_tx.clone()
    }

    /// One sweep over the undecided backlog.
    ///
    /// Rows without a recorded owner, and rows whose re-verification errors,
    /// are logged and skipped; they stay in the backlog for the next sweep.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let undecided = self.ledger.list_undecided(self.config.sweep_limit).await?;
        let swept = undecided.len();
        let mut decided = 0;
        let mut failed = 0;

        for xact in undecided {
            match self.reverify(&xact).await {
                Ok(Outcome::Decided(verdict)) => {
                    decided += 1;
                    debug!(xact_id = %xact.xact_id, verdict = %verdict, "reconciled transaction");
                }
                Ok(Outcome::Undecided) => {}
                Err(e) => {
                    failed += 1;
                    warn!(xact_id = %xact.xact_id, error = %e, "reconciliation failed, skipping row");
                }
            }
        }

        let backlog = self.ledger.undecided_count().await?;
        let report = SweepReport {
            swept,
            decided,
            failed,
            backlog,
            threshold: self.config.backlog_threshold,
        };

        if report.backlog_exceeded() {
            warn!(
                backlog = report.backlog,
                threshold = self.config.backlog_threshold,
                "verification backlog exceeds threshold, processing is falling behind"
            );
        }

        Ok(report)
    }

    async fn reverify(&self, xact: &Transaction) -> Result<Outcome> {
        let owner_id = match xact.identity_id {
            Some(id) => id,
            None => {
                // A row created without an owner cannot be attributed yet.
                debug!(xact_id = %xact.xact_id, "undecided row has no owner, skipping");
                return Ok(Outcome::Undecided);
            }
        };

        let owner = self
            .identities
            .get(owner_id)
            .await?
            .ok_or(crate::infra::VerifyError::IdentityNotFound(owner_id.0))?;

        self.engine.verify(xact, &owner).await
    }

    /// Run the reconciler until shutdown.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            sweep_limit = self.config.sweep_limit,
            "starting backlog reconciler"
        );

        let mut ticker = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "reconciler sweep failed");
                    }
                }
                Some(msg) = self.control_rx.recv() => {
                    match msg {
                        ReconcilerMessage::SweepNow => {
                            if let Err(e) = self.run_once().await {
                                error!(error = %e, "forced reconciler sweep failed");
                            }
                        }
                        ReconcilerMessage::Shutdown => {
                            info!("backlog reconciler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Spawn the reconciler as a background task.
pub fn spawn_reconciler(
    config: ReconcilerConfig,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn TransactionLedger>,
    engine: Arc<VerificationEngine>,
) -> (
    tokio::task::JoinHandle<()>,
    mpsc::Sender<ReconcilerMessage>,
) {
    let reconciler = Reconciler::new(config, identities, ledger, engine);
    let control_handle = reconciler.control_handle();
    let handle = tokio::spawn(reconciler.run());
    (handle, control_handle)
}
