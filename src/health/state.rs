//! Peer connectivity states.
//!
//! # States
//! - Idle: connected earlier, no activity since
//! - Connecting: a dial is in progress
//! - Ready: last dial succeeded
//! - TransientFailure: last dial failed, a later probe may recover
//! - Shutdown: the connection was closed and will not be used again
//!
//! Ready and Idle count as healthy; everything else is unhealthy.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ConnectivityState::Ready | ConnectivityState::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        }
    }

    /// Explanation attached to an unhealthy snapshot.
    pub fn unhealthy_reason(&self) -> Option<&'static str> {
        match self {
            ConnectivityState::Ready | ConnectivityState::Idle => None,
            ConnectivityState::Connecting => Some("connection in progress"),
            ConnectivityState::TransientFailure => Some("transient connection failure"),
            ConnectivityState::Shutdown => Some("connection shutdown"),
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
