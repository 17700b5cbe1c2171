//! Gateway client seam.

use async_trait::async_trait;

use crate::gateway::types::{
    Credentials, GatewayResult, GatewayTransactionRequest, GatewayTransactionResponse,
};

/// Ledger gateway collaborator.
///
/// Implementations must map every failure to a [`GatewayErrorKind`] so the
/// retry engine can classify it.
///
/// [`GatewayErrorKind`]: crate::gateway::GatewayErrorKind
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Endorse and submit a transaction under the given identity.
    async fn submit_transaction(
        &self,
        request: &GatewayTransactionRequest,
        credentials: &Credentials,
    ) -> GatewayResult<GatewayTransactionResponse>;

    /// Current ledger state of a submitted transaction.
    async fn get_transaction(&self, tx_id: &str) -> GatewayResult<GatewayTransactionResponse>;

    /// Read-only chaincode evaluation.
    async fn query_chaincode(
        &self,
        channel: &str,
        chaincode: &str,
        function: &str,
        args: &[String],
    ) -> GatewayResult<Vec<u8>>;
}
