//! Transaction records, status history and request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::{GatewayTransactionRequest, TransientData};

/// Lifecycle status of a transaction.
///
/// ```text
/// Pending → Submitted → Committed | Failed | Timeout
/// Pending → Committed | Failed   (gateway reported a final outcome at once)
/// ```
/// Committed, Failed and Timeout are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Submitted,
    Committed,
    Failed,
    Timeout,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::Failed | TransactionStatus::Timeout
        )
    }

    /// Whether `next` is an allowed edge from this status.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Committed)
                | (Pending, Failed)
                | (Submitted, Committed)
                | (Submitted, Failed)
                | (Submitted, Timeout)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submission attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Ledger-assigned id; empty until the gateway accepts the submission.
    #[serde(default)]
    pub tx_id: String,
    pub user_id: Uuid,
    #[serde(rename = "channel_id")]
    pub channel: String,
    #[serde(rename = "chaincode_id")]
    pub chaincode: String,
    #[serde(rename = "function_name")]
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "TransientData::is_empty")]
    pub transient_data: TransientData,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Fresh `Pending` record for `request`.
    pub fn new(user_id: Uuid, request: SubmitTransactionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_id: String::new(),
            user_id,
            channel: request.channel,
            chaincode: request.chaincode,
            function: request.function,
            args: request.args,
            transient_data: request.transient_data,
            status: TransactionStatus::Pending,
            block_number: None,
            error_message: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn gateway_request(&self) -> GatewayTransactionRequest {
        GatewayTransactionRequest {
            channel: self.channel.clone(),
            chaincode: self.chaincode.clone(),
            function: self.function.clone(),
            args: self.args.clone(),
            transient_data: self.transient_data.clone(),
        }
    }
}

/// Append-only audit entry, one per status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(transaction_id: Uuid, status: TransactionStatus, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            status,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Caller's request to submit a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitTransactionRequest {
    #[serde(rename = "channel_id")]
    pub channel: String,
    #[serde(rename = "chaincode_id")]
    pub chaincode: String,
    #[serde(rename = "function_name")]
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub transient_data: TransientData,
}

impl SubmitTransactionRequest {
    pub fn new(
        channel: impl Into<String>,
        chaincode: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chaincode: chaincode.into(),
            function: function.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.channel.trim().is_empty() {
            missing.push("channel");
        }
        if self.chaincode.trim().is_empty() {
            missing.push("chaincode");
        }
        if self.function.trim().is_empty() {
            missing.push("function");
        }
        missing
    }
}

/// Filters for listing transactions. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilters {
    pub user_id: Option<Uuid>,
    pub channel: Option<String>,
    pub chaincode: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Inclusive lower bound on `submitted_at`.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `submitted_at`.
    pub end_date: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl TransactionFilters {
    pub fn with_status(status: TransactionStatus, limit: usize) -> Self {
        Self {
            status: Some(status),
            limit,
            ..Self::default()
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.user_id.map_or(true, |u| tx.user_id == u)
            && self.channel.as_ref().map_or(true, |c| &tx.channel == c)
            && self.chaincode.as_ref().map_or(true, |c| &tx.chaincode == c)
            && self.status.map_or(true, |s| tx.status == s)
            && self.start_date.map_or(true, |d| tx.submitted_at >= d)
            && self.end_date.map_or(true, |d| tx.submitted_at <= d)
    }
}

/// A single status transition to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub tx_id: Option<String>,
    pub block_number: Option<u64>,
    pub error_message: Option<String>,
    /// Text for the matching history entry.
    pub details: String,
}

impl StatusUpdate {
    pub fn new(status: TransactionStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            tx_id: None,
            block_number: None,
            error_message: None,
            details: details.into(),
        }
    }

    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }

    pub fn with_block_number(mut self, block_number: Option<u64>) -> Self {
        self.block_number = block_number;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
