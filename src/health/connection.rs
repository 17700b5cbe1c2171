//! Low-level peer connection handle.
//!
//! The monitor only needs two things from a connection: a way to probe it
//! and the connectivity state that probe left behind.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::PeerConfig;
use crate::health::state::ConnectivityState;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {endpoint} timed out after {}ms", .after.as_millis())]
    Timeout { endpoint: String, after: Duration },

    #[error("connection to {endpoint} is closed")]
    Closed { endpoint: String },
}

/// Connection to the ledger-side peer.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn endpoint(&self) -> &str;

    /// State left behind by the most recent probe.
    fn state(&self) -> ConnectivityState;

    /// Exercise the connection once, updating [`state`](Self::state).
    async fn probe(&self) -> Result<(), ConnectionError>;
}

/// Peer reached over plain TCP. Each probe is a fresh dial.
#[derive(Debug)]
pub struct TcpPeerConnection {
    endpoint: String,
    dial_timeout: Duration,
    state: Mutex<ConnectivityState>,
}

impl TcpPeerConnection {
    pub fn new(config: &PeerConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            dial_timeout: config.probe_timeout(),
            state: Mutex::new(ConnectivityState::Idle),
        }
    }

    /// Mark the connection as shut down. Later probes fail immediately.
    pub fn close(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectivityState::Shutdown;
        tracing::info!(endpoint = %self.endpoint, "Peer connection closed");
    }

    /// Store `next` unless the connection was closed meanwhile.
    fn set_state(&self, next: ConnectivityState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != ConnectivityState::Shutdown {
            *state = next;
        }
    }
}

#[async_trait]
impl PeerConnection for TcpPeerConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn state(&self) -> ConnectivityState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn probe(&self) -> Result<(), ConnectionError> {
        if self.state() == ConnectivityState::Shutdown {
            return Err(ConnectionError::Closed {
                endpoint: self.endpoint.clone(),
            });
        }

        self.set_state(ConnectivityState::Connecting);
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(_stream)) => {
                self.set_state(ConnectivityState::Ready);
                Ok(())
            }
            Ok(Err(source)) => {
                self.set_state(ConnectivityState::TransientFailure);
                Err(ConnectionError::Dial {
                    endpoint: self.endpoint.clone(),
                    source,
                })
            }
            Err(_) => {
                self.set_state(ConnectivityState::TransientFailure);
                Err(ConnectionError::Timeout {
                    endpoint: self.endpoint.clone(),
                    after: self.dial_timeout,
                })
            }
        }
    }
}
