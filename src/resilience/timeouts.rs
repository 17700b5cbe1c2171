//! Timeout enforcement.
//!
//! Every external call (submit, poll, query, health probe) runs under a
//! deadline. A timeout is mapped into the caller's own error type so it flows
//! through retry classification like any other failure.

use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline, converting expiry into an error via `on_timeout`.
pub async fn with_timeout<T, E, Fut, F>(duration: Duration, fut: Fut, on_timeout: F) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    F: FnOnce(Duration) -> E,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(duration)),
    }
}
