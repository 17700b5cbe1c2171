//! Ledger gateway integration subsystem.
//!
//! # Data Flow
//! ```text
//! TransactionService
//!     → client.rs (GatewayClient trait, the seam tests fake)
//!     → http.rs (REST implementation with timeouts)
//!     → types.rs (requests, ledger statuses, enumerated error kinds)
//! ```
//!
//! # Security Constraints
//! - Credentials are passed explicitly per call, never through ambient state
//! - Never log private keys or API keys

pub mod client;
pub mod http;
pub mod types;

pub use client::GatewayClient;
pub use http::HttpGatewayClient;
pub use types::{
    Credentials, GatewayError, GatewayErrorKind, GatewayResult, GatewayTransactionRequest,
    GatewayTransactionResponse, LedgerStatus, TransientData,
};
