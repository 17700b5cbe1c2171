//! Peer health subsystem.
//!
//! # Data Flow
//! ```text
//! connection.rs (PeerConnection: probe + mirrored state)
//!     → monitor.rs (deadline, snapshot, wait/continuous loops)
//!     → callback / metrics / logs
//! ```
//!
//! # Design Decisions
//! - Health is observed, not enforced: submissions never consult it
//! - The monitor only mutates its own bookkeeping (last snapshot)

pub mod connection;
pub mod monitor;
pub mod state;

pub use connection::{ConnectionError, PeerConnection, TcpPeerConnection};
pub use monitor::{ConnectionHealthMonitor, HealthError, HealthStatus};
pub use state::ConnectivityState;
