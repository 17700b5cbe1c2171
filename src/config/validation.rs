//! Semantic configuration checks.
//!
//! Serde handles syntax; these checks catch values that parse but cannot
//! work (zero intervals, impossible ratios, inverted bounds).

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.gateway.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "gateway.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "gateway.base_url",
            format!("invalid URL '{}': {}", config.gateway.base_url, e),
        )),
    }
    if config.gateway.request_timeout_secs == 0 {
        errors.push(ValidationError::new("gateway.request_timeout_secs", "must be > 0"));
    }

    if config.peer.endpoint.trim().is_empty() {
        errors.push(ValidationError::new("peer.endpoint", "must not be empty"));
    }

    let cb = &config.circuit_breaker;
    if cb.max_requests == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_requests", "must be > 0"));
    }
    if !(cb.failure_ratio > 0.0 && cb.failure_ratio <= 1.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_ratio",
            format!("must be in (0, 1], got {}", cb.failure_ratio),
        ));
    }
    if cb.interval_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.interval_secs", "must be > 0"));
    }

    let retries = &config.retries;
    if !retries.backoff_multiplier.is_finite() || retries.backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "retries.backoff_multiplier",
            format!("must be a finite value >= 1.0, got {}", retries.backoff_multiplier),
        ));
    }
    if retries.initial_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.initial_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    let sub = &config.submission;
    if sub.submit_timeout_secs == 0 {
        errors.push(ValidationError::new("submission.submit_timeout_secs", "must be > 0"));
    }
    if sub.poll_interval_ms == 0 {
        errors.push(ValidationError::new("submission.poll_interval_ms", "must be > 0"));
    } else if sub.poll_interval() >= sub.poll_deadline() {
        errors.push(ValidationError::new(
            "submission.poll_interval_ms",
            "must be shorter than submission.poll_deadline_secs",
        ));
    }
    if sub.poll_request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "submission.poll_request_timeout_secs",
            "must be > 0",
        ));
    }
    if sub.default_query_limit == 0 || sub.default_query_limit > sub.max_query_limit {
        errors.push(ValidationError::new(
            "submission.default_query_limit",
            "must be in 1..=submission.max_query_limit",
        ));
    }

    let hc = &config.health_check;
    if hc.enabled && (hc.interval_secs == 0 || hc.timeout_secs == 0 || hc.wait_interval_ms == 0) {
        errors.push(ValidationError::new(
            "health_check",
            "interval_secs, timeout_secs and wait_interval_ms must be > 0",
        ));
    }

    let rec = &config.reconciliation;
    if rec.enabled && (rec.interval_secs == 0 || rec.batch_size == 0) {
        errors.push(ValidationError::new(
            "reconciliation",
            "interval_secs and batch_size must be > 0",
        ));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected 'pretty' or 'json', got '{}'", other),
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
