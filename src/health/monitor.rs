//! Connection health monitor.
//!
//! # Responsibilities
//! - Probe the peer connection with a deadline
//! - Report snapshots (healthy, state, latency, error)
//! - Wait for the peer to become healthy, bounded
//! - Run continuous checks that feed a callback
//!
//! Snapshots are for alerting only. Submissions are gated by the circuit
//! breaker, never by this monitor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::connection::PeerConnection;
use crate::health::state::ConnectivityState;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub endpoint: String,
    pub state: ConnectivityState,
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_check_time: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("timeout waiting for healthy connection to {endpoint} after {}ms", .waited.as_millis())]
    Timeout {
        endpoint: String,
        waited: Duration,
        last_error: Option<String>,
    },

    #[error("stopped waiting for {endpoint}: shutting down")]
    Cancelled { endpoint: String },
}

pub struct ConnectionHealthMonitor {
    connection: Arc<dyn PeerConnection>,
    probe_timeout: Duration,
    wait_interval: Duration,
    last: RwLock<Option<HealthStatus>>,
}

impl ConnectionHealthMonitor {
    pub fn new(connection: Arc<dyn PeerConnection>, config: &HealthCheckConfig) -> Self {
        Self {
            connection,
            probe_timeout: config.timeout(),
            wait_interval: config.wait_interval(),
            last: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.connection.endpoint()
    }

    /// Most recent snapshot, if any check has run.
    pub fn last_status(&self) -> Option<HealthStatus> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Probe the connection once.
    pub async fn check_health(&self) -> HealthStatus {
        let started = Instant::now();
        let checked_at = Utc::now();

        let probe_error = match tokio::time::timeout(self.probe_timeout, self.connection.probe()).await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "health probe timed out after {}ms",
                self.probe_timeout.as_millis()
            )),
        };

        let state = self.connection.state();
        let error = probe_error.or_else(|| state.unhealthy_reason().map(str::to_string));
        let status = HealthStatus {
            healthy: error.is_none() && state.is_healthy(),
            endpoint: self.connection.endpoint().to_string(),
            state,
            latency: started.elapsed(),
            error,
            last_check_time: checked_at,
        };

        tracing::debug!(
            endpoint = %status.endpoint,
            healthy = status.healthy,
            state = %status.state,
            response_time_ms = status.latency.as_millis() as u64,
            "Health check completed"
        );
        metrics::record_peer_health(&status.endpoint, status.healthy, status.latency);

        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        status
    }

    /// Poll until healthy, `timeout` elapses, or shutdown.
    pub async fn wait_for_healthy(
        &self,
        shutdown: &ShutdownSignal,
        timeout: Duration,
    ) -> Result<HealthStatus, HealthError> {
        let mut shutdown = shutdown.clone();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_error = None;

        loop {
            let status = self.check_health().await;
            if status.healthy {
                tracing::info!(
                    endpoint = %status.endpoint,
                    response_time_ms = status.latency.as_millis() as u64,
                    "Connection is healthy"
                );
                return Ok(status);
            }

            tracing::debug!(
                state = %status.state,
                error = status.error.as_deref().unwrap_or_default(),
                "Waiting for healthy connection"
            );
            last_error = status.error.or(last_error);

            let next = tokio::time::Instant::now() + self.wait_interval;
            if next > deadline {
                return Err(HealthError::Timeout {
                    endpoint: self.endpoint().to_string(),
                    waited: timeout,
                    last_error,
                });
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    return Err(HealthError::Cancelled {
                        endpoint: self.endpoint().to_string(),
                    });
                }
                _ = tokio::time::sleep_until(next) => {}
            }
        }
    }

    /// Check every `interval` until shutdown, handing each snapshot to
    /// `callback`.
    pub fn start_continuous_health_check<F>(
        self: &Arc<Self>,
        shutdown: ShutdownSignal,
        interval: Duration,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: Fn(&HealthStatus) + Send + Sync + 'static,
    {
        let monitor = Arc::clone(self);
        let mut shutdown = shutdown;

        tokio::spawn(async move {
            tracing::info!(
                endpoint = %monitor.endpoint(),
                interval_ms = interval.as_millis() as u64,
                "Starting continuous health check"
            );

            let mut ticker = interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Stopping continuous health check");
                        break;
                    }
                    _ = ticker.tick() => {
                        let status = monitor.check_health().await;
                        callback(&status);
                        if !status.healthy {
                            tracing::warn!(
                                endpoint = %status.endpoint,
                                state = %status.state,
                                error = status.error.as_deref().unwrap_or_default(),
                                "Unhealthy connection detected"
                            );
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ConnectionHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHealthMonitor")
            .field("endpoint", &self.connection.endpoint())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}
