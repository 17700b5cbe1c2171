//! Retry logic.
//!
//! # Responsibilities
//! - Classify errors as retryable or fatal
//! - Execute retries with exponential backoff + jitter
//! - Stop immediately when the process is shutting down
//!
//! # Design Decisions
//! - Classification is an explicit trait over enumerated error kinds, never
//!   message matching
//! - Fatal errors are returned unchanged on first occurrence
//! - At most `max_retries + 1` invocations

use std::future::Future;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Errors that know whether a repeat attempt could succeed.
pub trait Retryable {
    /// Timeouts, refused/reset connections and transient network conditions.
    fn is_retryable(&self) -> bool;
}

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The operation failed with a non-retryable error.
    #[error(transparent)]
    Fatal(E),

    /// Every allowed attempt failed with a retryable error.
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// Shutdown was signalled before the operation could succeed.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal(_) => 1,
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts } => {
                *attempts
            }
        }
    }

    /// The last underlying error, if the operation ran at all.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Fatal(e) | RetryError::Exhausted { last: e, .. } => Some(e),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, exhausts its retries, or
/// shutdown is signalled.
pub async fn retry_with_backoff<T, E, F, Fut>(
    shutdown: &ShutdownSignal,
    config: &RetryConfig,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Retryable + 'static,
{
    let mut shutdown = shutdown.clone();
    let mut backoff = Backoff::new(config);
    let mut attempts = 0u32;

    loop {
        if shutdown.is_triggered() {
            return Err(RetryError::Cancelled { attempts });
        }

        attempts += 1;
        let err = match op().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Gateway call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::warn!(error = %err, attempts, "Error is not retryable, stopping retries");
            return Err(RetryError::Fatal(err));
        }

        if attempts > config.max_retries {
            tracing::warn!(error = %err, attempts, "Retries exhausted");
            return Err(RetryError::Exhausted {
                attempts,
                last: err,
            });
        }

        let delay = backoff.next_delay();
        tracing::info!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying gateway call"
        );
        metrics::record_retry();

        tokio::select! {
            _ = shutdown.recv() => return Err(RetryError::Cancelled { attempts }),
            _ = sleep(delay) => {}
        }
    }
}
