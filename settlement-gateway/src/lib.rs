//! # Settlement Gateway
//!
//! HTTP adapter for the payment network. Implements the `PaymentGateway` port
//! over the network's REST API, authenticated with a server key.

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use settlement_types::{
    GatewayAck, GatewayError, GatewayPaymentId, GatewayPaymentRequest, PaymentGateway,
};

use crate::wire::{
    CompletePaymentBody, CreatePaymentBody, IncompletePaymentsResponse, PaymentDto,
    SubmitResponse, error_message,
};

/// Connection settings for the payment network.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    /// Upper bound for each individual call
    pub timeout: Duration,
}

/// Payment network client.
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    http: Client,
}

fn transport_err(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

impl HttpGateway {
    /// Creates a new client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let resp = self
            .http
            .get(self.url(path))
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await
            .map_err(transport_err)?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let resp = self
            .http
            .post(self.url(path))
            .header("Authorization", format!("Key {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(transport_err)?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        let body = resp.text().await.map_err(transport_err)?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        } else {
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create(&self, req: GatewayPaymentRequest) -> Result<GatewayPaymentId, GatewayError> {
        tracing::debug!(recipient = %req.recipient, amount = %req.amount, "creating payment");
        let dto: PaymentDto = self
            .post("/payments", &CreatePaymentBody::from(req))
            .await?;
        dto.payment_id()
    }

    async fn submit(&self, payment_id: &GatewayPaymentId) -> Result<String, GatewayError> {
        tracing::debug!(%payment_id, "submitting payment");
        let resp: SubmitResponse = self
            .post(
                &format!("/payments/{}/submit", payment_id),
                &serde_json::json!({}),
            )
            .await?;
        resp.into_txid()
    }

    async fn complete(
        &self,
        payment_id: &GatewayPaymentId,
        txid: &str,
    ) -> Result<GatewayAck, GatewayError> {
        tracing::debug!(%payment_id, txid, "completing payment");
        let dto: PaymentDto = self
            .post(
                &format!("/payments/{}/complete", payment_id),
                &CompletePaymentBody { txid },
            )
            .await?;
        dto.into_ack(txid)
    }

    async fn cancel(&self, payment_id: &GatewayPaymentId) -> Result<(), GatewayError> {
        tracing::debug!(%payment_id, "cancelling payment");
        let _: PaymentDto = self
            .post(
                &format!("/payments/{}/cancel", payment_id),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }

    async fn list_incomplete(&self) -> Result<Vec<GatewayPaymentId>, GatewayError> {
        let resp: IncompletePaymentsResponse =
            self.get("/payments/incomplete_server_payments").await?;
        resp.incomplete_server_payments
            .iter()
            .map(PaymentDto::payment_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: base_url.to_string(),
            api_key: "secret".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_gateway_creation() {
        let gateway = HttpGateway::new(config("https://network.example/v2")).unwrap();
        assert_eq!(gateway.base_url, "https://network.example/v2");
    }

    #[test]
    fn test_gateway_with_trailing_slash() {
        let gateway = HttpGateway::new(config("https://network.example/v2/")).unwrap();
        assert_eq!(
            gateway.url("/payments"),
            "https://network.example/v2/payments"
        );
    }
}
