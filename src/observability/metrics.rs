//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ledger_transactions_submitted_total` (counter): accepted submission requests
//! - `ledger_transaction_transitions_total` (counter): status transitions by status
//! - `ledger_gateway_retries_total` (counter): retried gateway attempts
//! - `ledger_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `ledger_circuit_breaker_rejections_total` (counter): fast-failed calls
//! - `ledger_peer_health` (gauge): 1=healthy, 0=unhealthy
//! - `ledger_peer_health_latency_seconds` (histogram): probe latency
//! - `ledger_commit_latency_seconds` (histogram): submission to terminal status
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests never need to call [`init_metrics`].

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_submission() {
    counter!("ledger_transactions_submitted_total").increment(1);
}

pub fn record_transition(status: &'static str) {
    counter!("ledger_transaction_transitions_total", "status" => status).increment(1);
}

pub fn record_retry() {
    counter!("ledger_gateway_retries_total").increment(1);
}

pub fn record_breaker_state(breaker: &str, state_code: u8) {
    gauge!("ledger_circuit_breaker_state", "breaker" => breaker.to_string())
        .set(f64::from(state_code));
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("ledger_circuit_breaker_rejections_total", "breaker" => breaker.to_string())
        .increment(1);
}

pub fn record_peer_health(endpoint: &str, healthy: bool, latency: Duration) {
    gauge!("ledger_peer_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
    histogram!("ledger_peer_health_latency_seconds").record(latency.as_secs_f64());
}

pub fn record_commit_latency(latency: Duration) {
    histogram!("ledger_commit_latency_seconds").record(latency.as_secs_f64());
}
