//! Commit status poller.
//!
//! Polls the gateway on a fixed interval until the ledger reports a final
//! status, the overall deadline passes, or shutdown. Poll errors are logged
//! and polling continues; only the deadline turns silence into a timeout.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::config::SubmissionConfig;
use crate::gateway::{GatewayClient, GatewayError, LedgerStatus};
use crate::lifecycle::ShutdownSignal;
use crate::resilience::timeouts::with_timeout;

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Committed { block_number: Option<u64> },
    Rejected { reason: String },
    /// The deadline passed without a final status.
    TimedOut { deadline: Duration, polls: u32 },
    /// Shutdown stopped the poller. No transition must be written.
    Cancelled,
}

#[derive(Clone)]
pub struct StatusPoller {
    gateway: Arc<dyn GatewayClient>,
    interval: Duration,
    deadline: Duration,
    request_timeout: Duration,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn GatewayClient>, config: &SubmissionConfig) -> Self {
        Self {
            gateway,
            interval: config.poll_interval(),
            deadline: config.poll_deadline(),
            request_timeout: config.poll_request_timeout(),
        }
    }

    pub async fn poll(&self, tx_id: &str, shutdown: &ShutdownSignal) -> PollOutcome {
        let mut shutdown = shutdown.clone();
        let deadline = sleep(self.deadline);
        tokio::pin!(deadline);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u32;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => return self.cancelled(tx_id, polls),
                _ = &mut deadline => return self.timed_out(tx_id, polls),
                _ = ticker.tick() => {}
            }

            polls += 1;
            let request = with_timeout(
                self.request_timeout,
                self.gateway.get_transaction(tx_id),
                GatewayError::timeout,
            );

            // The in-flight request does not outlive the deadline or shutdown.
            let response = tokio::select! {
                biased;

                _ = shutdown.recv() => return self.cancelled(tx_id, polls),
                _ = &mut deadline => return self.timed_out(tx_id, polls),
                response = request => response,
            };

            match response {
                Ok(resp) if resp.status == LedgerStatus::Valid => {
                    return PollOutcome::Committed { block_number: resp.block_number };
                }
                Ok(resp) if resp.status.is_rejected() => {
                    return PollOutcome::Rejected { reason: resp.rejection_reason() };
                }
                Ok(resp) => {
                    tracing::debug!(tx_id, polls, status = %resp.status, "Transaction not final yet");
                }
                Err(e) => {
                    tracing::warn!(tx_id, polls, error = %e, "Failed to poll transaction status");
                }
            }
        }
    }

    fn cancelled(&self, tx_id: &str, polls: u32) -> PollOutcome {
        tracing::info!(tx_id, polls, "Status poller stopped by shutdown");
        PollOutcome::Cancelled
    }

    fn timed_out(&self, tx_id: &str, polls: u32) -> PollOutcome {
        tracing::warn!(tx_id, polls, deadline_secs = self.deadline.as_secs(), "Transaction polling timed out");
        PollOutcome::TimedOut { deadline: self.deadline, polls }
    }
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("interval", &self.interval)
            .field("deadline", &self.deadline)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{
        Credentials, GatewayErrorKind, GatewayResult, GatewayTransactionRequest,
        GatewayTransactionResponse,
    };
    use crate::lifecycle::Shutdown;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted poll results; once exhausted reports PENDING.
    #[derive(Default)]
    struct ScriptedLedger {
        polls: Mutex<VecDeque<GatewayResult<GatewayTransactionResponse>>>,
        calls: AtomicU32,
    }

    impl ScriptedLedger {
        fn with(script: Vec<GatewayResult<GatewayTransactionResponse>>) -> Arc<Self> {
            Arc::new(Self {
                polls: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    fn response(status: LedgerStatus, block: Option<u64>, reason: Option<&str>) -> GatewayTransactionResponse {
        GatewayTransactionResponse {
            id: String::new(),
            tx_id: "tx-1".into(),
            status,
            block_number: block,
            reason: reason.map(str::to_string),
            timestamp: None,
        }
    }

    #[async_trait]
    impl GatewayClient for ScriptedLedger {
        async fn submit_transaction(
            &self,
            _request: &GatewayTransactionRequest,
            _credentials: &Credentials,
        ) -> GatewayResult<GatewayTransactionResponse> {
            unreachable!("poller never submits")
        }

        async fn get_transaction(&self, _tx_id: &str) -> GatewayResult<GatewayTransactionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(response(LedgerStatus::Pending, None, None)))
        }

        async fn query_chaincode(
            &self,
            _channel: &str,
            _chaincode: &str,
            _function: &str,
            _args: &[String],
        ) -> GatewayResult<Vec<u8>> {
            unreachable!("poller never queries")
        }
    }

    /// Accepts the status request and never answers.
    #[derive(Default)]
    struct HangingLedger {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GatewayClient for HangingLedger {
        async fn submit_transaction(
            &self,
            _request: &GatewayTransactionRequest,
            _credentials: &Credentials,
        ) -> GatewayResult<GatewayTransactionResponse> {
            unreachable!("poller never submits")
        }

        async fn get_transaction(&self, _tx_id: &str) -> GatewayResult<GatewayTransactionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }

        async fn query_chaincode(
            &self,
            _channel: &str,
            _chaincode: &str,
            _function: &str,
            _args: &[String],
        ) -> GatewayResult<Vec<u8>> {
            unreachable!("poller never queries")
        }
    }

    fn config(interval_ms: u64, deadline_secs: u64) -> SubmissionConfig {
        SubmissionConfig {
            poll_interval_ms: interval_ms,
            poll_deadline_secs: deadline_secs,
            poll_request_timeout_secs: 1,
            ..SubmissionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_after_pending_and_errors() {
        let ledger = ScriptedLedger::with(vec![
            Ok(response(LedgerStatus::Pending, None, None)),
            Err(GatewayError::new(GatewayErrorKind::Unavailable, "503")),
            Ok(response(LedgerStatus::Valid, Some(77), None)),
        ]);
        let poller = StatusPoller::new(ledger.clone(), &config(2000, 60));

        let outcome = poller.poll("tx-1", &ShutdownSignal::never()).await;
        assert_eq!(outcome, PollOutcome::Committed { block_number: Some(77) });
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_carries_reason() {
        let ledger = ScriptedLedger::with(vec![Ok(response(
            LedgerStatus::Invalid,
            Some(3),
            Some("MVCC_READ_CONFLICT"),
        ))]);
        let poller = StatusPoller::new(ledger, &config(2000, 60));

        let outcome = poller.poll("tx-1", &ShutdownSignal::never()).await;
        assert_eq!(
            outcome,
            PollOutcome::Rejected {
                reason: "MVCC_READ_CONFLICT".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out() {
        let ledger = ScriptedLedger::with(Vec::new());
        let poller = StatusPoller::new(ledger.clone(), &config(2000, 60));

        match poller.poll("tx-1", &ShutdownSignal::never()).await {
            PollOutcome::TimedOut { deadline, polls } => {
                assert_eq!(deadline, Duration::from_secs(60));
                assert!(polls >= 29 && polls <= 30, "polls = {polls}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_without_outcome() {
        let ledger = ScriptedLedger::with(Vec::new());
        let poller = StatusPoller::new(ledger, &config(2000, 60));
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();

        let handle = tokio::spawn(async move { poller.poll("tx-1", &signal).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.trigger();

        assert_eq!(handle.await.unwrap(), PollOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_hung_request() {
        let ledger = Arc::new(HangingLedger::default());
        let poller = StatusPoller::new(
            ledger.clone(),
            &SubmissionConfig {
                poll_deadline_secs: 60,
                poll_request_timeout_secs: 300,
                ..SubmissionConfig::default()
            },
        );

        let started = Instant::now();
        let outcome = poller.poll("tx-1", &ShutdownSignal::never()).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, PollOutcome::TimedOut { polls: 1, .. }), "{outcome:?}");
        assert!(elapsed >= Duration::from_secs(60), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(61), "elapsed {elapsed:?}");
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_hung_request() {
        let ledger = Arc::new(HangingLedger::default());
        let poller = StatusPoller::new(
            ledger.clone(),
            &SubmissionConfig {
                poll_interval_ms: 1000,
                poll_deadline_secs: 60,
                poll_request_timeout_secs: 300,
                ..SubmissionConfig::default()
            },
        );
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();

        let started = Instant::now();
        let handle = tokio::spawn(async move { poller.poll("tx-1", &signal).await });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);
        shutdown.trigger();

        assert_eq!(handle.await.unwrap(), PollOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(6));
    }
}
