//! Gateway request/response types and error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::Retryable;

/// Opaque key/value payload forwarded to chaincode as transient data.
pub type TransientData = BTreeMap<String, String>;

/// Identity used to authenticate a submitter to the ledger network.
///
/// # Security
/// The private key is never logged; `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Identity domain (MSP) the certificate belongs to.
    pub msp_id: String,
    /// PEM-encoded certificate.
    pub certificate: String,
    private_key: String,
}

impl Credentials {
    pub fn new(
        msp_id: impl Into<String>,
        certificate: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            msp_id: msp_id.into(),
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }

    /// PEM-encoded private key.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("msp_id", &self.msp_id)
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Transaction submission sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayTransactionRequest {
    pub channel: String,
    pub chaincode: String,
    pub function: String,
    pub args: Vec<String>,
    pub transient_data: TransientData,
}

/// Ledger-side status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    /// Committed and validated in a block.
    Valid,
    /// Included in a block but marked invalid.
    Invalid,
    /// Endorsement or ordering failed.
    Failed,
    /// Accepted, not yet in a block.
    Pending,
    /// Any status string this client does not know.
    Other(String),
}

impl LedgerStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "VALID" | "COMMITTED" => LedgerStatus::Valid,
            "INVALID" => LedgerStatus::Invalid,
            "FAILED" => LedgerStatus::Failed,
            "PENDING" | "SUBMITTED" => LedgerStatus::Pending,
            _ => LedgerStatus::Other(status.to_string()),
        }
    }

    /// Invalid and Failed: the ledger refused the transaction on its merits.
    pub fn is_rejected(&self) -> bool {
        matches!(self, LedgerStatus::Invalid | LedgerStatus::Failed)
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerStatus::Valid => f.write_str("VALID"),
            LedgerStatus::Invalid => f.write_str("INVALID"),
            LedgerStatus::Failed => f.write_str("FAILED"),
            LedgerStatus::Pending => f.write_str("PENDING"),
            LedgerStatus::Other(s) => f.write_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for LedgerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(LedgerStatus::parse(&raw))
    }
}

impl Serialize for LedgerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Transaction state as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransactionResponse {
    #[serde(default)]
    pub id: String,
    pub tx_id: String,
    pub status: LedgerStatus,
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Ledger-reported reason for an invalid/failed transaction.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl GatewayTransactionResponse {
    /// Ledger-supplied reason, or the bare status when none was given.
    pub fn rejection_reason(&self) -> String {
        self.reason
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("ledger reported status {}", self.status))
    }
}

/// Enumerated failure classes surfaced by gateway clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    Timeout,
    ConnectionRefused,
    ConnectionReset,
    /// Transient unavailability: network unreachable, 502/503, throttling.
    Unavailable,
    NotFound,
    Unauthorized,
    /// The gateway refused the request on its merits (4xx).
    Rejected,
    /// Response could not be understood.
    Protocol,
    /// Non-transient server-side failure.
    Internal,
}

impl GatewayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::ConnectionRefused => "connection refused",
            GatewayErrorKind::ConnectionReset => "connection reset",
            GatewayErrorKind::Unavailable => "unavailable",
            GatewayErrorKind::NotFound => "not found",
            GatewayErrorKind::Unauthorized => "unauthorized",
            GatewayErrorKind::Rejected => "rejected",
            GatewayErrorKind::Protocol => "protocol error",
            GatewayErrorKind::Internal => "internal error",
        }
    }
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a [`GatewayClient`](super::GatewayClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gateway {kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            format!("no response after {}ms", after.as_millis()),
        )
    }
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            GatewayErrorKind::Timeout
                | GatewayErrorKind::ConnectionRefused
                | GatewayErrorKind::ConnectionReset
                | GatewayErrorKind::Unavailable
        )
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
