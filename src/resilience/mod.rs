//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway call:
//!     → retries.rs (outer loop: classify, back off, stop on shutdown)
//!     → circuit_breaker.rs (per attempt: fail fast when open, count outcome)
//!     → timeouts.rs (deadline on the call itself)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient conditions are retried
//! - An open breaker is a fatal outcome for the retry loop, so it never
//!   burns retry budget
//! - Breakers are explicit instances, one per dependency

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use retries::{retry_with_backoff, RetryError, Retryable};
