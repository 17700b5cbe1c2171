//! Circuit breaker for gateway protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: dependency assumed down, requests fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: requests >= max_requests && failures/requests >= failure_ratio
//! Open → Half-Open: first call after next_attempt_at
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - One instance per downstream dependency, owned by the composing service
//! - Fail fast in Open state (the wrapped call is never invoked)
//! - Single probe in Half-Open; concurrent callers are rejected while it runs
//! - State lives behind one mutex, never held across the wrapped call

use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::retries::Retryable;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    fn metric_code(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error + 'static,
{
    /// Rejected without invoking the wrapped call.
    #[error("circuit breaker is open: {name} is unavailable")]
    Open { name: String },

    /// The wrapped call ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> Retryable for BreakerError<E>
where
    E: std::error::Error + Retryable + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            BreakerError::Open { .. } => false,
            BreakerError::Inner(e) => e.is_retryable(),
        }
    }
}

/// Point-in-time view of a breaker, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub requests: u32,
    pub failures: u32,
    pub successes: u32,
    /// Milliseconds until a probe is allowed (Open only).
    pub next_attempt_in_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    requests: u32,
    failures: u32,
    successes: u32,
    window_start: Instant,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn reset_counters(&mut self, now: Instant) {
        self.requests = 0;
        self.failures = 0;
        self.successes = 0;
        self.window_start = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Probe,
}

/// Tri-state circuit breaker wrapping arbitrary async calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    max_requests: u32,
    interval: Duration,
    open_timeout: Duration,
    failure_ratio: f64,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::with_settings(
            name,
            config.max_requests,
            config.interval(),
            config.open_timeout(),
            config.failure_ratio,
        )
    }

    pub fn with_settings(
        name: impl Into<String>,
        max_requests: u32,
        interval: Duration,
        open_timeout: Duration,
        failure_ratio: f64,
    ) -> Self {
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed.metric_code());
        Self {
            name,
            max_requests: max_requests.max(1),
            interval,
            open_timeout,
            failure_ratio,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                requests: 0,
                failures: 0,
                successes: 0,
                window_start: Instant::now(),
                next_attempt_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An expired Open state is reported as Open until the
    /// next call turns it into a probe.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        let next_attempt_in_ms = match (inner.state, inner.next_attempt_at) {
            (CircuitState::Open, Some(at)) => {
                Some(at.saturating_duration_since(Instant::now()).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            requests: inner.requests,
            failures: inner.failures,
            successes: inner.successes,
            next_attempt_in_ms,
        }
    }

    /// Run `f` under breaker protection.
    ///
    /// While Open, returns [`BreakerError::Open`] without calling `f`.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let permit = match self.acquire() {
            Some(permit) => permit,
            None => {
                metrics::record_breaker_rejection(&self.name);
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }
        };

        let mut guard = CallGuard {
            breaker: self,
            permit,
            recorded: false,
        };

        let result = f().await;
        guard.record(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Option<Permit> {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                if now.duration_since(inner.window_start) >= self.interval {
                    inner.reset_counters(now);
                }
                Some(Permit::Normal)
            }
            CircuitState::Open => {
                let expired = inner.next_attempt_at.map_or(true, |at| now > at);
                if !expired {
                    tracing::warn!(
                        breaker = %self.name,
                        state = %inner.state,
                        "Circuit breaker is open, rejecting request"
                    );
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.reset_counters(now);
                inner.probe_in_flight = true;
                Some(Permit::Probe)
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    tracing::debug!(breaker = %self.name, "Probe in flight, rejecting request");
                    return None;
                }
                inner.probe_in_flight = true;
                Some(Permit::Probe)
            }
        }
    }

    fn on_result(&self, permit: Permit, success: bool) {
        let now = Instant::now();
        let mut inner = self.lock();

        if permit == Permit::Probe {
            inner.probe_in_flight = false;
            if inner.state != CircuitState::HalfOpen {
                return;
            }
            if success {
                self.transition(&mut inner, CircuitState::Closed);
                inner.reset_counters(now);
                inner.next_attempt_at = None;
                tracing::info!(breaker = %self.name, "Circuit breaker closed after successful probe");
            } else {
                self.transition(&mut inner, CircuitState::Open);
                inner.next_attempt_at = Some(now + self.open_timeout);
                tracing::warn!(breaker = %self.name, "Circuit breaker re-opened after failed probe");
            }
            return;
        }

        // Normal permits only count while still Closed; results that land
        // after another caller tripped the breaker are discarded.
        if inner.state != CircuitState::Closed {
            return;
        }

        inner.requests += 1;
        if success {
            inner.successes += 1;
        } else {
            inner.failures += 1;
        }

        if inner.requests >= self.max_requests {
            let failure_rate = f64::from(inner.failures) / f64::from(inner.requests);
            if failure_rate >= self.failure_ratio {
                tracing::warn!(
                    breaker = %self.name,
                    failure_rate,
                    failures = inner.failures,
                    requests = inner.requests,
                    "Circuit breaker opened"
                );
                self.transition(&mut inner, CircuitState::Open);
                inner.next_attempt_at = Some(now + self.open_timeout);
            }
            inner.reset_counters(now);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state != to {
            tracing::info!(breaker = %self.name, from = %inner.state, to = %to, "Circuit breaker state change");
            inner.state = to;
            metrics::record_breaker_state(&self.name, to.metric_code());
        }
    }
}

/// Records the outcome of an admitted call. A call dropped before
/// completing counts as a failure so a probe slot is never leaked.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    recorded: bool,
}

impl CallGuard<'_> {
    fn record(&mut self, success: bool) {
        self.recorded = true;
        self.breaker.on_result(self.permit, success);
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.on_result(self.permit, false);
        }
    }
}
