//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging/metrics → Build service → Recover in-flight
//!     → Start health monitor + reconciliation sweep
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Trigger watch channel → Tasks stop at next await
//!     → Drain in-flight tasks (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One process-level scope; background tasks never inherit a caller's scope
//! - Interrupted work is left in a non-terminal status and picked up by recovery

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
