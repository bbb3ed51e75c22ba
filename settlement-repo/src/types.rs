//! Database row types and their conversion into domain types.
//!
//! SQLite stores UUIDs and timestamps as TEXT (RFC 3339) and amounts as
//! INTEGER micro-units. Any stored value outside the closed domain vocabulary
//! surfaces as `RepoError::Integrity`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use settlement_types::{
    Amount, BatchTask, BatchTaskId, Deposit, DepositId, DividendPool, MerchantSettlement,
    Payment, PaymentId, PaymentOwner, RecipientShare, RepoError, RunId, SettlementId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Batch task row from database.
#[derive(FromRow)]
pub struct DbBatchTask {
    pub id: String,
    pub external_batch_id: String,
    pub initiating_user_id: Option<String>,
    pub deposit_reference: Option<String>,
    pub total_amount: i64,
    pub recipient_count: i64,
    pub status: String,
    pub metadata: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub run_id: Option<String>,
    pub heartbeat_at: Option<String>,
}

/// Recipient line row from database.
#[derive(FromRow)]
pub struct DbRecipient {
    pub recipient_address: String,
    pub amount: i64,
}

/// Payment row from database.
#[derive(FromRow)]
pub struct DbPayment {
    pub id: String,
    pub owner_kind: String,
    pub owner_id: String,
    pub external_payment_id: Option<String>,
    pub recipient_address: String,
    pub amount: i64,
    pub memo: String,
    pub status: String,
    pub txid: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Status count row for aggregate queries.
#[derive(FromRow)]
pub struct DbStatusCount {
    pub status: String,
    pub n: i64,
}

/// Merchant settlement row from database.
#[derive(FromRow)]
pub struct DbSettlement {
    pub id: String,
    pub deposit_reference: String,
    pub merchant_id: String,
    pub merchant_address: String,
    pub gross_amount: i64,
    pub merchant_amount: i64,
    pub dividend_amount: i64,
    pub status: String,
    pub payment_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Dividend pool row from database.
#[derive(FromRow)]
pub struct DbDividendPool {
    pub merchant_id: String,
    pub balance: i64,
    pub updated_at: String,
}

/// Deposit row from database.
#[derive(FromRow)]
pub struct DbDeposit {
    pub id: String,
    pub gateway_payment_id: String,
    pub depositor_user_id: String,
    pub depositor_address: Option<String>,
    pub amount: i64,
    pub status: String,
    pub expires_at: String,
    pub payout_payment_id: Option<String>,
    pub payout_txid: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Status-only row for compare-and-set reads.
#[derive(FromRow)]
pub struct DbStatus {
    pub status: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(|e| RepoError::Integrity(format!("bad uuid {s:?}: {e}")))
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepoError::Integrity(format!("bad timestamp {s:?}: {e}")))
}

pub fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, RepoError> {
    s.as_deref().map(parse_ts).transpose()
}

pub fn parse_amount(micros: i64) -> Result<Amount, RepoError> {
    Amount::from_micros(micros).map_err(|e| RepoError::Integrity(e.to_string()))
}

/// Parses a closed-vocabulary status column.
pub fn parse_status<T>(s: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = settlement_types::DomainError>,
{
    T::from_str(s).map_err(|e| RepoError::Integrity(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbBatchTask {
    /// Convert database row to domain BatchTask.
    pub fn into_domain(self) -> Result<BatchTask, RepoError> {
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepoError::Integrity(format!("bad metadata: {e}")))?;

        Ok(BatchTask {
            id: BatchTaskId::from_uuid(parse_uuid(&self.id)?),
            external_batch_id: self.external_batch_id,
            initiating_user_id: self.initiating_user_id,
            deposit_reference: self.deposit_reference,
            total_amount: parse_amount(self.total_amount)?,
            recipient_count: self.recipient_count,
            status: parse_status(&self.status)?,
            metadata,
            created_at: parse_ts(&self.created_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
            run_id: self
                .run_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(RunId::from_uuid),
            heartbeat_at: parse_opt_ts(self.heartbeat_at)?,
        })
    }
}

impl DbRecipient {
    pub fn into_domain(self) -> Result<RecipientShare, RepoError> {
        Ok(RecipientShare {
            recipient_address: self.recipient_address,
            amount: parse_amount(self.amount)?,
        })
    }
}

impl DbPayment {
    /// Convert database row to domain Payment.
    pub fn into_domain(self) -> Result<Payment, RepoError> {
        let owner = PaymentOwner::from_parts(&self.owner_kind, parse_uuid(&self.owner_id)?)
            .map_err(|e| RepoError::Integrity(e.to_string()))?;

        Ok(Payment {
            id: PaymentId::from_uuid(parse_uuid(&self.id)?),
            owner,
            external_payment_id: self.external_payment_id,
            recipient_address: self.recipient_address,
            amount: parse_amount(self.amount)?,
            memo: self.memo,
            status: parse_status(&self.status)?,
            txid: self.txid,
            error_message: self.error_message,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl DbSettlement {
    /// Convert database row to domain MerchantSettlement.
    pub fn into_domain(self) -> Result<MerchantSettlement, RepoError> {
        let payment_id = self
            .payment_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(PaymentId::from_uuid);

        Ok(MerchantSettlement {
            id: SettlementId::from_uuid(parse_uuid(&self.id)?),
            deposit_reference: self.deposit_reference,
            merchant_id: self.merchant_id,
            merchant_address: self.merchant_address,
            gross_amount: parse_amount(self.gross_amount)?,
            merchant_amount: parse_amount(self.merchant_amount)?,
            dividend_amount: parse_amount(self.dividend_amount)?,
            status: parse_status(&self.status)?,
            payment_id,
            error_message: self.error_message,
            created_at: parse_ts(&self.created_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
        })
    }
}

impl DbDividendPool {
    pub fn into_domain(self) -> Result<DividendPool, RepoError> {
        Ok(DividendPool {
            merchant_id: self.merchant_id,
            balance: parse_amount(self.balance)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl DbDeposit {
    /// Convert database row to domain Deposit.
    pub fn into_domain(self) -> Result<Deposit, RepoError> {
        Ok(Deposit {
            id: DepositId::from_uuid(parse_uuid(&self.id)?),
            gateway_payment_id: self.gateway_payment_id,
            depositor_user_id: self.depositor_user_id,
            depositor_address: self.depositor_address,
            amount: parse_amount(self.amount)?,
            status: parse_status(&self.status)?,
            expires_at: parse_ts(&self.expires_at)?,
            payout_payment_id: self.payout_payment_id,
            payout_txid: self.payout_txid,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}
