//! Logging and metrics.
//!
//! ```text
//! service, poller, breaker, retry loop, health monitor
//!     → logging.rs: tracing events keyed by transaction_id / tx_id
//!     → metrics.rs: submissions, transitions, retries, breaker state,
//!                   peer health, commit latency
//! ```
//!
//! Logs go to stdout, pretty or JSON. Metrics are served for Prometheus
//! scraping when enabled in config.

pub mod logging;
pub mod metrics;
