//! Timeout reconciliation.
//!
//! A transaction marked `Timeout` may still have committed after the poller
//! gave up. The sweep re-checks such records against the ledger and reports
//! what it finds. `Timeout` is terminal, so nothing is rewritten.

use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::lifecycle::ShutdownSignal;
use crate::transaction::service::TransactionService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LateOutcome {
    pub transaction_id: Uuid,
    pub tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub examined: usize,
    /// Timed out here, committed on the ledger.
    pub late_commits: Vec<LateOutcome>,
    /// Timed out here, rejected on the ledger.
    pub late_rejections: Vec<LateOutcome>,
    /// Still not final on the ledger.
    pub unresolved: Vec<Uuid>,
    /// Records that could not be checked (no tx id, gateway error).
    pub errors: usize,
}

impl ReconciliationReport {
    pub fn has_discrepancies(&self) -> bool {
        !self.late_commits.is_empty() || !self.late_rejections.is_empty()
    }
}

/// Run [`TransactionService::reconcile_timeouts`] every `interval`.
pub fn spawn_reconciliation_loop(
    service: TransactionService,
    interval: Duration,
    batch_size: usize,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    let mut shutdown = shutdown;
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), batch_size, "Reconciliation sweep scheduled");

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Reconciliation loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = service.reconcile_timeouts(batch_size).await {
                        tracing::error!(error = %e, "Reconciliation sweep failed");
                    }
                }
            }
        }
    })
}
