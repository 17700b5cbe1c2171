//! Transaction submission and status tracking.
//!
//! # Flow
//! ```text
//! submit_transaction (caller's path)
//!     → validate → persist Pending + history → return record
//!     → spawn submission task
//!         → timeout(retry(breaker(gateway.submit)))
//!         → final status at once: Committed | Failed
//!         → otherwise Submitted → spawn poller → Committed | Failed | Timeout
//! ```
//!
//! Background tasks run under the process-level shutdown signal, never the
//! caller's lifetime. Every transition writes the status and its history
//! entry in one repository call; outcomes are observed by re-reading the
//! record.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{RelayConfig, RetryConfig};
use crate::gateway::{
    Credentials, GatewayClient, GatewayError, GatewayTransactionRequest,
    GatewayTransactionResponse, LedgerStatus,
};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{retry_with_backoff, CircuitBreaker, CircuitBreakerStats};
use crate::transaction::error::TransactionError;
use crate::transaction::model::{
    StatusHistoryEntry, StatusUpdate, SubmitTransactionRequest, Transaction, TransactionFilters,
    TransactionStatus,
};
use crate::transaction::poller::{PollOutcome, StatusPoller};
use crate::transaction::reconcile::{LateOutcome, ReconciliationReport};
use crate::transaction::repository::TransactionRepository;
use crate::transaction::tasks::{TaskClaim, TaskKind, TaskRegistry};

const INTERRUPTED_SUBMISSION: &str = "submission interrupted before gateway acknowledgement";

/// Result of [`TransactionService::recover_in_flight`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Submitted records whose poller was re-attached.
    pub reattached: usize,
    /// Records moved to Failed because their outcome cannot be recovered.
    pub failed: usize,
    /// Records already owned by a live task.
    pub skipped: usize,
    /// Records whose history was missing their current status.
    pub repaired: usize,
}

/// Resilient transaction pipeline. Cheap to clone.
#[derive(Clone)]
pub struct TransactionService {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn GatewayClient>,
    repository: Arc<dyn TransactionRepository>,
    breaker: Arc<CircuitBreaker>,
    poller: StatusPoller,
    retry: RetryConfig,
    submit_timeout: Duration,
    request_timeout: Duration,
    poll_request_timeout: Duration,
    default_query_limit: usize,
    max_query_limit: usize,
    tasks: TaskRegistry,
    shutdown: ShutdownSignal,
}

impl TransactionService {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        repository: Arc<dyn TransactionRepository>,
        breaker: Arc<CircuitBreaker>,
        config: &RelayConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let submission = &config.submission;
        Self {
            inner: Arc::new(Inner {
                poller: StatusPoller::new(Arc::clone(&gateway), submission),
                gateway,
                repository,
                breaker,
                retry: config.retries.clone(),
                submit_timeout: submission.submit_timeout(),
                request_timeout: config.gateway.request_timeout(),
                poll_request_timeout: submission.poll_request_timeout(),
                default_query_limit: submission.default_query_limit,
                max_query_limit: submission.max_query_limit,
                tasks: TaskRegistry::new(),
                shutdown,
            }),
        }
    }

    /// Validate, persist a `Pending` record and hand the submission to a
    /// background task. Returns before any gateway call completes.
    pub async fn submit_transaction(
        &self,
        user_id: Uuid,
        request: SubmitTransactionRequest,
        credentials: Credentials,
    ) -> Result<Transaction, TransactionError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(TransactionError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        validate_credentials(&credentials)?;

        let tx = Transaction::new(user_id, request);
        let created = StatusHistoryEntry::new(tx.id, TransactionStatus::Pending, "Transaction created");
        if let Err(e) = self.inner.repository.create_with_history(&tx, &created).await {
            tracing::error!(transaction_id = %tx.id, error = %e, "Failed to create transaction record");
            return Err(e.into());
        }

        metrics::record_submission();
        metrics::record_transition(TransactionStatus::Pending.as_str());
        tracing::info!(
            transaction_id = %tx.id,
            user_id = %user_id,
            channel = %tx.channel,
            chaincode = %tx.chaincode,
            function = %tx.function,
            "Transaction accepted"
        );

        match self.inner.tasks.claim(tx.id, TaskKind::Submission) {
            Some(claim) => {
                tokio::spawn(Arc::clone(&self.inner).run_submission(tx.clone(), credentials, claim));
            }
            None => {
                tracing::warn!(transaction_id = %tx.id, "Transaction already owned by a task");
            }
        }

        Ok(tx)
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, TransactionError> {
        Ok(self.inner.repository.get_transaction_by_id(id).await?)
    }

    pub async fn get_transaction_by_tx_id(
        &self,
        tx_id: &str,
    ) -> Result<Transaction, TransactionError> {
        Ok(self.inner.repository.get_transaction_by_tx_id(tx_id).await?)
    }

    /// List transactions. A zero limit means the default; larger limits are
    /// capped.
    pub async fn query_transactions(
        &self,
        mut filters: TransactionFilters,
    ) -> Result<Vec<Transaction>, TransactionError> {
        filters.limit = match filters.limit {
            0 => self.inner.default_query_limit,
            n => n.min(self.inner.max_query_limit),
        };
        Ok(self.inner.repository.query_transactions(&filters).await?)
    }

    /// Chronological history of one transaction.
    pub async fn get_status_history(
        &self,
        id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, TransactionError> {
        Ok(self.inner.repository.get_status_history(id).await?)
    }

    /// Read-only chaincode evaluation through the breaker.
    pub async fn query_chaincode(
        &self,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, TransactionError> {
        let target = SubmitTransactionRequest::new(channel, chaincode, function);
        let missing = target.missing_fields();
        if !missing.is_empty() {
            return Err(TransactionError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let gateway = &*self.inner.gateway;
        let timeout = self.inner.request_timeout;
        let result = self
            .inner
            .breaker
            .call(move || {
                with_timeout(
                    timeout,
                    gateway.query_chaincode(channel, chaincode, function, args),
                    GatewayError::timeout,
                )
            })
            .await;

        result.map_err(|e| {
            tracing::error!(channel, chaincode, function, error = %e, "Failed to query via gateway");
            TransactionError::from(e)
        })
    }

    /// Resume tracking after a restart.
    ///
    /// Histories that stop short of their record's status are completed
    /// first. Submitted records then get a fresh poller. Pending records
    /// cannot be resubmitted (credentials are never stored, and the gateway
    /// may have accepted them), so they fail.
    pub async fn recover_in_flight(&self) -> Result<RecoveryReport, TransactionError> {
        let mut report = RecoveryReport::default();
        let repository = &self.inner.repository;

        report.repaired = self.repair_histories().await?;

        let submitted = repository
            .query_transactions(&TransactionFilters::with_status(
                TransactionStatus::Submitted,
                usize::MAX,
            ))
            .await?;
        for tx in submitted {
            let Some(claim) = self.inner.tasks.claim(tx.id, TaskKind::Poll) else {
                report.skipped += 1;
                continue;
            };

            if tx.tx_id.trim().is_empty() {
                let update = StatusUpdate::new(TransactionStatus::Failed, "Recovery failed")
                    .with_error("submitted record has no ledger transaction id");
                if self.inner.transition(tx.id, update).await.is_ok() {
                    report.failed += 1;
                }
                continue;
            }

            tracing::info!(transaction_id = %tx.id, tx_id = %tx.tx_id, "Re-attaching status poller");
            tokio::spawn(Arc::clone(&self.inner).run_poller(tx.id, tx.tx_id, claim));
            report.reattached += 1;
        }

        let pending = repository
            .query_transactions(&TransactionFilters::with_status(
                TransactionStatus::Pending,
                usize::MAX,
            ))
            .await?;
        for tx in pending {
            let Some(_claim) = self.inner.tasks.claim(tx.id, TaskKind::Submission) else {
                report.skipped += 1;
                continue;
            };

            let update = StatusUpdate::new(TransactionStatus::Failed, "Recovered after restart")
                .with_error(INTERRUPTED_SUBMISSION);
            if self.inner.transition(tx.id, update).await.is_ok() {
                report.failed += 1;
            }
        }

        tracing::info!(
            reattached = report.reattached,
            failed = report.failed,
            skipped = report.skipped,
            repaired = report.repaired,
            "Recovery of in-flight transactions finished"
        );
        Ok(report)
    }

    /// Append the entry a record's history is missing, for records written
    /// by a store that did not keep transition and history together.
    async fn repair_histories(&self) -> Result<usize, TransactionError> {
        let repository = &self.inner.repository;
        let records = repository
            .query_transactions(&TransactionFilters {
                limit: usize::MAX,
                ..TransactionFilters::default()
            })
            .await?;

        let mut repaired = 0;
        for tx in records {
            if self.inner.tasks.active_kind(tx.id).is_some() {
                continue;
            }

            let history = repository.get_status_history(tx.id).await?;
            let last = history.last().map(|entry| entry.status);
            if last == Some(tx.status) {
                continue;
            }

            if history.is_empty() && tx.status != TransactionStatus::Pending {
                repository
                    .add_status_history(&StatusHistoryEntry::new(
                        tx.id,
                        TransactionStatus::Pending,
                        "Transaction created",
                    ))
                    .await?;
            }
            repository
                .add_status_history(&StatusHistoryEntry::new(
                    tx.id,
                    tx.status,
                    format!("Restored after restart: {} recorded without history", tx.status),
                ))
                .await?;

            tracing::warn!(
                transaction_id = %tx.id,
                status = %tx.status,
                last_recorded = ?last,
                "Repaired status history"
            );
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Re-check up to `batch_size` timed-out transactions against the
    /// ledger. Records are reported, never rewritten.
    pub async fn reconcile_timeouts(
        &self,
        batch_size: usize,
    ) -> Result<ReconciliationReport, TransactionError> {
        let records = self
            .inner
            .repository
            .query_transactions(&TransactionFilters::with_status(
                TransactionStatus::Timeout,
                batch_size,
            ))
            .await?;

        let mut report = ReconciliationReport::default();
        for tx in records {
            report.examined += 1;
            if tx.tx_id.trim().is_empty() {
                report.errors += 1;
                continue;
            }

            let response = with_timeout(
                self.inner.poll_request_timeout,
                self.inner.gateway.get_transaction(&tx.tx_id),
                GatewayError::timeout,
            )
            .await;

            match response {
                Ok(resp) => match resp.status {
                    LedgerStatus::Valid => {
                        tracing::warn!(
                            transaction_id = %tx.id,
                            tx_id = %tx.tx_id,
                            block_number = resp.block_number,
                            "Timed-out transaction was committed on the ledger"
                        );
                        report.late_commits.push(LateOutcome {
                            transaction_id: tx.id,
                            tx_id: tx.tx_id,
                            block_number: resp.block_number,
                            reason: None,
                        });
                    }
                    ref status if status.is_rejected() => {
                        report.late_rejections.push(LateOutcome {
                            reason: Some(resp.rejection_reason()),
                            transaction_id: tx.id,
                            tx_id: tx.tx_id,
                            block_number: resp.block_number,
                        });
                    }
                    _ => report.unresolved.push(tx.id),
                },
                Err(e) => {
                    tracing::warn!(transaction_id = %tx.id, tx_id = %tx.tx_id, error = %e, "Reconciliation check failed");
                    report.errors += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            late_commits = report.late_commits.len(),
            late_rejections = report.late_rejections.len(),
            unresolved = report.unresolved.len(),
            errors = report.errors,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.inner.breaker.stats()
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.inner.tasks
    }
}

impl Inner {
    async fn run_submission(self: Arc<Self>, tx: Transaction, credentials: Credentials, claim: TaskClaim) {
        let request = tx.gateway_request();
        tracing::info!(
            transaction_id = %tx.id,
            channel = %request.channel,
            chaincode = %request.chaincode,
            function = %request.function,
            msp_id = %credentials.msp_id,
            "Submitting transaction via gateway"
        );

        match self.submit_with_resilience(&request, &credentials).await {
            Ok(resp) => self.apply_submission(tx.id, resp, claim).await,
            Err(TransactionError::Cancelled) => {
                tracing::info!(transaction_id = %tx.id, "Submission cancelled by shutdown, record stays pending");
            }
            Err(e) => {
                tracing::error!(transaction_id = %tx.id, error = %e, "Failed to submit transaction via gateway");
                let update = StatusUpdate::new(TransactionStatus::Failed, format!("Submission failed: {}", e))
                    .with_error(e.to_string());
                let _ = self.transition(tx.id, update).await;
            }
        }
    }

    async fn submit_with_resilience(
        &self,
        request: &GatewayTransactionRequest,
        credentials: &Credentials,
    ) -> Result<GatewayTransactionResponse, TransactionError> {
        let breaker = &*self.breaker;
        let gateway = &*self.gateway;
        let attempts = retry_with_backoff(&self.shutdown, &self.retry, move || {
            breaker.call(move || gateway.submit_transaction(request, credentials))
        });

        with_timeout(
            self.submit_timeout,
            async move { attempts.await.map_err(TransactionError::from) },
            TransactionError::SubmitTimeout,
        )
        .await
    }

    async fn apply_submission(self: Arc<Self>, id: Uuid, resp: GatewayTransactionResponse, claim: TaskClaim) {
        if resp.tx_id.trim().is_empty() {
            let update = StatusUpdate::new(TransactionStatus::Failed, "Submission failed")
                .with_error("gateway accepted submission without a transaction id");
            let _ = self.transition(id, update).await;
            return;
        }

        match resp.status {
            LedgerStatus::Valid => {
                let update = StatusUpdate::new(TransactionStatus::Committed, committed_details(resp.block_number))
                    .with_tx_id(&resp.tx_id)
                    .with_block_number(resp.block_number);
                let _ = self.transition(id, update).await;
            }
            ref status if status.is_rejected() => {
                let reason = resp.rejection_reason();
                let update = StatusUpdate::new(TransactionStatus::Failed, "Transaction validation failed")
                    .with_tx_id(&resp.tx_id)
                    .with_error(TransactionError::GatewayRejection(reason).to_string());
                let _ = self.transition(id, update).await;
            }
            _ => {
                let update = StatusUpdate::new(TransactionStatus::Submitted, "Transaction submitted via gateway")
                    .with_tx_id(&resp.tx_id);
                if self.transition(id, update).await.is_ok() {
                    let claim = claim.handoff(TaskKind::Poll);
                    tokio::spawn(Arc::clone(&self).run_poller(id, resp.tx_id, claim));
                }
            }
        }
    }

    async fn run_poller(self: Arc<Self>, id: Uuid, tx_id: String, claim: TaskClaim) {
        let _claim = claim;
        let update = match self.poller.poll(&tx_id, &self.shutdown).await {
            PollOutcome::Committed { block_number } => {
                StatusUpdate::new(TransactionStatus::Committed, committed_details(block_number))
                    .with_block_number(block_number)
            }
            PollOutcome::Rejected { reason } => {
                StatusUpdate::new(TransactionStatus::Failed, "Transaction validation failed")
                    .with_error(TransactionError::GatewayRejection(reason).to_string())
            }
            PollOutcome::TimedOut { deadline, .. } => {
                StatusUpdate::new(TransactionStatus::Timeout, "Transaction commit timeout")
                    .with_error(TransactionError::CommitTimeout(deadline).to_string())
            }
            PollOutcome::Cancelled => return,
        };
        let _ = self.transition(id, update).await;
    }

    /// Persist one transition with its history entry.
    async fn transition(&self, id: Uuid, update: StatusUpdate) -> Result<Transaction, TransactionError> {
        let updated = match self.repository.record_transition(id, &update).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(transaction_id = %id, status = %update.status, error = %e, "Failed to update transaction status");
                return Err(e.into());
            }
        };

        metrics::record_transition(update.status.as_str());
        if update.status.is_terminal() {
            if let Ok(latency) = (Utc::now() - updated.submitted_at).to_std() {
                metrics::record_commit_latency(latency);
            }
        }

        tracing::info!(
            transaction_id = %id,
            tx_id = %updated.tx_id,
            status = %updated.status,
            block_number = updated.block_number,
            "Transaction status updated"
        );
        Ok(updated)
    }
}

fn validate_credentials(credentials: &Credentials) -> Result<(), TransactionError> {
    let mut missing = Vec::new();
    if credentials.msp_id.trim().is_empty() {
        missing.push("msp_id");
    }
    if credentials.certificate.trim().is_empty() {
        missing.push("certificate");
    }
    if credentials.private_key().trim().is_empty() {
        missing.push("private_key");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TransactionError::Validation(format!(
            "missing credentials: {}",
            missing.join(", ")
        )))
    }
}

fn committed_details(block_number: Option<u64>) -> String {
    match block_number {
        Some(block) => format!("Transaction committed via gateway, block: {}", block),
        None => "Transaction committed via gateway".to_string(),
    }
}
