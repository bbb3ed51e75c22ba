//! Wire types of the payment network API.
//!
//! The network returns loosely-shaped JSON. Everything here is decoded into
//! explicit types and validated before it crosses into the orchestrator;
//! optional fields stay `Option` and are never defaulted to empty strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use settlement_types::{GatewayAck, GatewayError, GatewayPaymentId, GatewayPaymentRequest};

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreatePaymentBody {
    pub payment: CreatePaymentArgs,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentArgs {
    pub amount: Decimal,
    pub memo: String,
    pub metadata: serde_json::Value,
    pub recipient: String,
}

impl From<GatewayPaymentRequest> for CreatePaymentBody {
    fn from(req: GatewayPaymentRequest) -> Self {
        Self {
            payment: CreatePaymentArgs {
                amount: req.amount.to_decimal().normalize(),
                memo: req.memo,
                metadata: req.metadata,
                recipient: req.recipient,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletePaymentBody<'a> {
    pub txid: &'a str,
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Progress flags the network keeps per payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFlags {
    #[serde(default)]
    pub developer_approved: bool,
    #[serde(default)]
    pub transaction_verified: bool,
    #[serde(default)]
    pub developer_completed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub user_cancelled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionDto {
    pub txid: String,
    #[serde(default)]
    pub verified: bool,
}

/// A payment as the network reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDto {
    pub identifier: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub status: PaymentFlags,
    #[serde(default)]
    pub transaction: Option<TransactionDto>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub txid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncompletePaymentsResponse {
    #[serde(default)]
    pub incomplete_server_payments: Vec<PaymentDto>,
}

fn non_empty(value: Option<&str>, what: &str) -> Result<String, GatewayError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(GatewayError::InvalidResponse(format!("missing {what}"))),
    }
}

impl PaymentDto {
    pub fn payment_id(&self) -> Result<GatewayPaymentId, GatewayError> {
        non_empty(Some(&self.identifier), "payment identifier").map(GatewayPaymentId::new)
    }

    /// Checks that the network recorded completion against `txid`.
    pub fn into_ack(self, txid: &str) -> Result<GatewayAck, GatewayError> {
        let payment_id = self.payment_id()?;

        if self.status.cancelled || self.status.user_cancelled {
            return Err(GatewayError::InvalidResponse(format!(
                "payment {payment_id} was cancelled"
            )));
        }
        if !self.status.developer_completed {
            return Err(GatewayError::InvalidResponse(format!(
                "payment {payment_id} not marked completed"
            )));
        }

        // Older responses omit the transaction block; the txid we sent stands.
        let recorded = match self.transaction {
            Some(tx) if tx.txid != txid => {
                return Err(GatewayError::InvalidResponse(format!(
                    "payment {payment_id} completed with txid {} instead of {txid}",
                    tx.txid
                )));
            }
            Some(tx) => tx.txid,
            None => txid.to_string(),
        };

        Ok(GatewayAck {
            payment_id,
            txid: recorded,
        })
    }
}

impl SubmitResponse {
    pub fn into_txid(self) -> Result<String, GatewayError> {
        non_empty(self.txid.as_deref(), "txid")
    }
}

/// Extracts an error message from a non-success body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error_message")
                .or_else(|| v.get("error"))
                .and_then(|e| e.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn completed_payment(txid: Option<&str>) -> PaymentDto {
        let mut value = json!({
            "identifier": "pay-1",
            "amount": "1.5",
            "to_address": "GDEST",
            "status": { "developer_approved": true, "developer_completed": true }
        });
        if let Some(txid) = txid {
            value["transaction"] = json!({ "txid": txid, "verified": true });
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_create_body_shape() {
        let body = CreatePaymentBody::from(GatewayPaymentRequest {
            recipient: "GDEST".into(),
            amount: "2.25".parse().unwrap(),
            memo: "payout".into(),
            metadata: json!({ "batch": "b-1" }),
        });

        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["payment"]["recipient"], "GDEST");
        assert_eq!(value["payment"]["amount"], "2.25");
        assert_eq!(value["payment"]["metadata"]["batch"], "b-1");
    }

    #[test]
    fn test_payment_with_missing_optional_fields() {
        let dto: PaymentDto = serde_json::from_value(json!({ "identifier": "pay-2" })).unwrap();

        assert_eq!(dto.payment_id().unwrap().as_str(), "pay-2");
        assert!(dto.from_address.is_none());
        assert!(dto.transaction.is_none());
        assert!(!dto.status.developer_completed);
    }

    #[test]
    fn test_amount_accepts_numbers() {
        let dto: PaymentDto =
            serde_json::from_value(json!({ "identifier": "pay-3", "amount": 3.5 })).unwrap();

        assert_eq!(dto.amount, Some(dec!(3.5)));
    }

    #[test]
    fn test_blank_identifier_rejected() {
        let dto: PaymentDto = serde_json::from_value(json!({ "identifier": "  " })).unwrap();

        assert!(matches!(
            dto.payment_id(),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_ack_matches_txid() {
        let ack = completed_payment(Some("tx-9")).into_ack("tx-9").unwrap();

        assert_eq!(ack.payment_id.as_str(), "pay-1");
        assert_eq!(ack.txid, "tx-9");
    }

    #[test]
    fn test_ack_without_transaction_block() {
        let ack = completed_payment(None).into_ack("tx-9").unwrap();

        assert_eq!(ack.txid, "tx-9");
    }

    #[test]
    fn test_ack_rejects_txid_mismatch() {
        let result = completed_payment(Some("tx-other")).into_ack("tx-9");

        assert!(matches!(result, Err(GatewayError::InvalidResponse(_))));
    }

    #[test]
    fn test_ack_rejects_incomplete_payment() {
        let dto: PaymentDto =
            serde_json::from_value(json!({ "identifier": "pay-1", "status": {} })).unwrap();

        assert!(matches!(
            dto.into_ack("tx-1"),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_ack_rejects_cancelled_payment() {
        let dto: PaymentDto = serde_json::from_value(json!({
            "identifier": "pay-1",
            "status": { "developer_completed": true, "cancelled": true }
        }))
        .unwrap();

        assert!(dto.into_ack("tx-1").is_err());
    }

    #[test]
    fn test_submit_requires_txid() {
        let empty: SubmitResponse = serde_json::from_value(json!({})).unwrap();
        let ok: SubmitResponse = serde_json::from_value(json!({ "txid": "tx-1" })).unwrap();

        assert!(empty.into_txid().is_err());
        assert_eq!(ok.into_txid().unwrap(), "tx-1");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":"bad"}"#), "bad");
        assert_eq!(error_message(r#"{"error_message":"worse"}"#), "worse");
        assert_eq!(error_message("plain text"), "plain text");
    }
}
