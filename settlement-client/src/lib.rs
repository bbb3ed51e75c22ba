//! # Settlement Client SDK
//!
//! A typed Rust client for the Settlement API.

use settlement_types::{
    AdmitBatchRequest, AdmitBatchResponse, BatchStatusView, BatchTaskId, ClaimRequest, Deposit,
    DepositId, DividendPool, IncompletePayment, ReconciliationReport, RecordDepositRequest,
    RecordDepositResponse, RefundRequest, SettleMerchantRequest, SettlementResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Settlement API client.
pub struct SettlementClient {
    base_url: String,
    http: Client,
}

impl SettlementClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // Batches

    /// Admits a fan-out. Dispatch happens in the background; poll
    /// [`SettlementClient::get_batch`] for the outcome.
    pub async fn admit_batch(
        &self,
        req: &AdmitBatchRequest,
    ) -> Result<AdmitBatchResponse, ClientError> {
        self.post("/api/batches", req).await
    }

    pub async fn get_batch(&self, id: BatchTaskId) -> Result<BatchStatusView, ClientError> {
        self.get(&format!("/api/batches/{}", id)).await
    }

    pub async fn get_batch_by_external_id(
        &self,
        external_batch_id: &str,
    ) -> Result<BatchStatusView, ClientError> {
        self.get(&format!("/api/batches/by-external/{}", external_batch_id))
            .await
    }

    /// Re-drives a batch stuck in `processing`.
    pub async fn resume_batch(&self, id: BatchTaskId) -> Result<BatchStatusView, ClientError> {
        self.post(&format!("/api/batches/{}/resume", id), &serde_json::json!({}))
            .await
    }

    // Deposits

    pub async fn record_deposit(
        &self,
        req: &RecordDepositRequest,
    ) -> Result<RecordDepositResponse, ClientError> {
        self.post("/api/deposits", req).await
    }

    pub async fn get_deposit(&self, id: DepositId) -> Result<Deposit, ClientError> {
        self.get(&format!("/api/deposits/{}", id)).await
    }

    /// Refunds an expired deposit to its depositor.
    pub async fn refund(&self, id: DepositId, caller_user_id: &str) -> Result<Deposit, ClientError> {
        let req = RefundRequest {
            caller_user_id: caller_user_id.to_string(),
        };
        self.post(&format!("/api/deposits/{}/refund", id), &req).await
    }

    pub async fn claim(&self, id: DepositId, req: &ClaimRequest) -> Result<Deposit, ClientError> {
        self.post(&format!("/api/deposits/{}/claim", id), req).await
    }

    // Merchant settlement

    pub async fn settle_merchant(
        &self,
        req: &SettleMerchantRequest,
    ) -> Result<SettlementResponse, ClientError> {
        self.post("/api/settlements", req).await
    }

    pub async fn dividend_pool(&self, merchant_id: &str) -> Result<DividendPool, ClientError> {
        self.get(&format!("/api/merchants/{}/dividend-pool", merchant_id))
            .await
    }

    // Reconciliation

    pub async fn reconcile(&self) -> Result<ReconciliationReport, ClientError> {
        self.get("/api/reconciliation").await
    }

    pub async fn cancel_incomplete(
        &self,
        gateway_payment_id: &str,
    ) -> Result<IncompletePayment, ClientError> {
        self.post(
            &format!("/api/reconciliation/{}/cancel", gateway_payment_id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SettlementClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = SettlementClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_api_error_status() {
        let err = ClientError::Api {
            status: 409,
            message: "already refunded".into(),
        };
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("already refunded"));
    }
}
