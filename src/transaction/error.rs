//! Transaction pipeline errors.
//!
//! Only `Validation` reaches the caller synchronously. Everything else ends
//! up in the record's `error_message` and a history entry.

use std::time::Duration;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::resilience::{BreakerError, RetryError, Retryable};
use crate::transaction::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum TransactionError {
    /// Malformed request; no record was created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transient gateway failure that outlived the retry budget.
    #[error("gateway unreachable after {attempts} attempts: {source}")]
    Connectivity {
        attempts: u32,
        #[source]
        source: GatewayError,
    },

    /// The gateway's breaker is open; nothing was sent.
    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    /// Non-retryable gateway failure.
    #[error("gateway request failed: {0}")]
    Gateway(#[source] GatewayError),

    /// Accepted but no final ledger status within the poll deadline.
    #[error("transaction not committed within {}s", .0.as_secs())]
    CommitTimeout(Duration),

    /// The ledger marked the transaction invalid or failed.
    #[error("ledger rejected transaction: {0}")]
    GatewayRejection(String),

    /// The whole submission, retries included, exceeded its deadline.
    #[error("submission timed out after {}s", .0.as_secs())]
    SubmitTimeout(Duration),

    /// Shutdown interrupted the submission before an outcome was known.
    #[error("submission cancelled by shutdown")]
    Cancelled,

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for TransactionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => TransactionError::NotFound(id),
            other => TransactionError::Repository(other),
        }
    }
}

impl From<BreakerError<GatewayError>> for TransactionError {
    fn from(err: BreakerError<GatewayError>) -> Self {
        match err {
            BreakerError::Open { name } => TransactionError::CircuitOpen(name),
            BreakerError::Inner(e) if e.is_retryable() => TransactionError::Connectivity {
                attempts: 1,
                source: e,
            },
            BreakerError::Inner(e) => TransactionError::Gateway(e),
        }
    }
}

impl From<RetryError<BreakerError<GatewayError>>> for TransactionError {
    fn from(err: RetryError<BreakerError<GatewayError>>) -> Self {
        match err {
            RetryError::Fatal(inner) => inner.into(),
            RetryError::Exhausted { attempts, last } => match last {
                BreakerError::Inner(source) => TransactionError::Connectivity { attempts, source },
                BreakerError::Open { name } => TransactionError::CircuitOpen(name),
            },
            RetryError::Cancelled { .. } => TransactionError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;

    #[test]
    fn test_retry_outcomes_map_to_taxonomy() {
        let open: TransactionError = RetryError::Fatal(BreakerError::<GatewayError>::Open {
            name: "gateway".into(),
        })
        .into();
        assert!(matches!(open, TransactionError::CircuitOpen(ref n) if n == "gateway"));

        let exhausted: TransactionError = RetryError::Exhausted {
            attempts: 4,
            last: BreakerError::Inner(GatewayError::new(GatewayErrorKind::Unavailable, "503")),
        }
        .into();
        assert!(matches!(exhausted, TransactionError::Connectivity { attempts: 4, .. }));
        assert!(exhausted.to_string().contains("after 4 attempts"));

        let fatal: TransactionError = RetryError::Fatal(BreakerError::Inner(GatewayError::new(
            GatewayErrorKind::Rejected,
            "bad args",
        )))
        .into();
        assert!(matches!(fatal, TransactionError::Gateway(_)));

        let cancelled: TransactionError =
            RetryError::<BreakerError<GatewayError>>::Cancelled { attempts: 1 }.into();
        assert!(matches!(cancelled, TransactionError::Cancelled));
    }

    #[test]
    fn test_repository_not_found_is_surfaced() {
        let err: TransactionError = RepositoryError::NotFound("abc".into()).into();
        assert!(matches!(err, TransactionError::NotFound(ref id) if id == "abc"));
    }
}
