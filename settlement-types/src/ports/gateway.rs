//! Payment network port.
//!
//! The external network runs a three-phase protocol per payout
//! (create -> submit -> complete). Each call is a suspension point that may
//! fail, hang until its timeout, or be retried independently by the caller.

use serde::{Deserialize, Serialize};

use crate::domain::Amount;

/// Opaque payment identifier issued by the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayPaymentId(String);

impl GatewayPaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for GatewayPaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error type for payment network operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rejected by payment network ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from payment network: {0}")]
    InvalidResponse(String),
}

/// Parameters for creating an outbound payment.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayPaymentRequest {
    pub recipient: String,
    pub amount: Amount,
    pub memo: String,
    pub metadata: serde_json::Value,
}

/// Acknowledgement that the network recorded a payment as completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAck {
    pub payment_id: GatewayPaymentId,
    pub txid: String,
}

/// Port trait for the payment network.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Registers a payment with the network and returns its identifier.
    async fn create(&self, req: GatewayPaymentRequest) -> Result<GatewayPaymentId, GatewayError>;

    /// Broadcasts the payment's transaction and returns its txid.
    async fn submit(&self, payment_id: &GatewayPaymentId) -> Result<String, GatewayError>;

    /// Marks the payment complete against the broadcast transaction.
    async fn complete(
        &self,
        payment_id: &GatewayPaymentId,
        txid: &str,
    ) -> Result<GatewayAck, GatewayError>;

    /// Cancels a payment that has not completed.
    async fn cancel(&self, payment_id: &GatewayPaymentId) -> Result<(), GatewayError>;

    /// Lists payments the network still considers open (stranded by a crash
    /// between phases).
    async fn list_incomplete(&self) -> Result<Vec<GatewayPaymentId>, GatewayError>;
}
