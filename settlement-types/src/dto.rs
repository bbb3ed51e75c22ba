//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Amount, BatchTask, Deposit, DividendPool, MerchantSettlement, Payment, PaymentCounts,
    RecipientShare,
};

// ─────────────────────────────────────────────────────────────────────────────
// Batch DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to admit a fan-out and dispatch it in the background.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitBatchRequest {
    /// Caller-supplied idempotency key for the fan-out
    pub external_batch_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiating_user_id: Option<String>,
    /// Reference of the originating deposit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_reference: Option<String>,
    /// Payout lines, dispatched in this order
    pub recipients: Vec<RecipientShare>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Response after admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitBatchResponse {
    pub task: BatchTask,
    /// True when the external batch id had already been admitted
    pub already_existed: bool,
}

/// Read-only rollup of a batch for client polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusView {
    pub task: BatchTask,
    pub counts: PaymentCounts,
    pub payments: Vec<Payment>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to record a confirmed inbound deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDepositRequest {
    pub gateway_payment_id: String,
    pub depositor_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depositor_address: Option<String>,
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
}

/// Response after recording a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDepositResponse {
    pub deposit: Deposit,
    pub already_existed: bool,
}

/// Request to refund an expired deposit back to its depositor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub caller_user_id: String,
}

/// Request to claim an active deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub claimant_user_id: String,
    pub claimant_address: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Settlement DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to settle a merchant deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleMerchantRequest {
    pub deposit_reference: String,
    pub merchant_id: String,
    pub merchant_address: String,
    pub gross_amount: Amount,
}

/// Settlement outcome together with the merchant's pool after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub settlement: MerchantSettlement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_pool: Option<DividendPool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A payment the network still reports as open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompletePayment {
    pub gateway_payment_id: String,
    /// Matching ledger row, if the ledger knows the payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_payment: Option<Payment>,
}

/// Administrative view of work stranded by a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub incomplete_payments: Vec<IncompletePayment>,
    /// Tasks whose dispatch run ended without a terminal status
    pub stuck_batches: Vec<BatchTask>,
    /// Settlements whose payout never reached a terminal status
    #[serde(default)]
    pub stuck_settlements: Vec<MerchantSettlement>,
    /// Deposits still holding the payout lock
    #[serde(default)]
    pub stuck_deposits: Vec<Deposit>,
}
