//! Resilient ledger transaction relay.
//!
//! Submits transactions to a ledger gateway and tracks each one to a final
//! outcome despite transient network failures and a degraded gateway.

pub mod config;
pub mod gateway;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transaction;

pub use config::RelayConfig;
pub use lifecycle::Shutdown;
pub use transaction::TransactionService;
