//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the ledger relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Gateway service connection settings.
    pub gateway: GatewayConfig,

    /// Ledger-side peer probed by the health monitor.
    pub peer: PeerConfig,

    /// Circuit breaker guarding the gateway.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration for gateway submissions.
    pub retries: RetryConfig,

    /// Submission and commit polling settings.
    pub submission: SubmissionConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout reconciliation sweep.
    pub reconciliation: ReconciliationConfig,

    /// Transaction store settings.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Gateway service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the gateway REST API (e.g., "http://gateway:3000").
    pub base_url: String,

    /// Optional service-to-service API key, sent as `X-API-Key`.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

/// Ledger peer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Peer endpoint as `host:port`.
    pub endpoint: String,

    /// Dial timeout for a single probe in milliseconds.
    pub probe_timeout_ms: u64,
}

impl PeerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:7051".to_string(),
            probe_timeout_ms: 5000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Minimum requests in a window before the failure ratio is evaluated.
    pub max_requests: u32,

    /// Length of the rolling counting window in seconds.
    pub interval_secs: u64,

    /// How long the breaker stays open before allowing a probe, in seconds.
    pub timeout_secs: u64,

    /// Failure ratio (0.0..=1.0) that trips the breaker.
    pub failure_ratio: f64,
}

impl CircuitBreakerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            interval_secs: 10,
            timeout_secs: 60,
            failure_ratio: 0.6,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Factor applied to the delay after every attempt.
    pub backoff_multiplier: f64,

    /// Add a bounded random offset to each delay.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Submission pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Overall deadline for the submission task (endorsement latency).
    pub submit_timeout_secs: u64,

    /// Interval between commit status polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Overall deadline for commit polling in seconds.
    pub poll_deadline_secs: u64,

    /// Timeout for a single status poll in seconds.
    pub poll_request_timeout_secs: u64,

    /// Limit applied to transaction queries that do not set one.
    pub default_query_limit: usize,

    /// Hard cap on transaction query limits.
    pub max_query_limit: usize,
}

impl SubmissionConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_secs(self.poll_deadline_secs)
    }

    pub fn poll_request_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_request_timeout_secs)
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            submit_timeout_secs: 30,
            poll_interval_ms: 2000,
            poll_deadline_secs: 60,
            poll_request_timeout_secs: 10,
            default_query_limit: 100,
            max_query_limit: 1000,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable continuous peer health checks.
    pub enabled: bool,

    /// Continuous check interval in seconds.
    pub interval_secs: u64,

    /// Timeout for a single check in seconds.
    pub timeout_secs: u64,

    /// Poll interval used while waiting for the peer to become healthy.
    pub wait_interval_ms: u64,

    /// How long startup waits for a healthy peer before carrying on.
    pub startup_wait_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn startup_wait(&self) -> Duration {
        Duration::from_secs(self.startup_wait_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            wait_interval_ms: 1000,
            startup_wait_secs: 30,
        }
    }
}

/// Reconciliation sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Periodically re-check timed-out transactions against the ledger.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Maximum records examined per sweep.
    pub batch_size: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            batch_size: 100,
        }
    }
}

/// Transaction store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot file. When unset the store is memory-only.
    pub snapshot_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
