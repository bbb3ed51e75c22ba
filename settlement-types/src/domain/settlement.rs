//! Merchant settlement domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::payment::PaymentId;
use super::split::Split;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a MerchantSettlement.
    SettlementId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettlementStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::UnknownStatus {
                entity: "settlement",
                value: other.to_string(),
            }),
        }
    }
}

/// An inbound deposit split between a merchant payout and the dividend pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantSettlement {
    pub id: SettlementId,
    /// Reference of the deposit being settled; unique.
    pub deposit_reference: String,
    pub merchant_id: String,
    pub merchant_address: String,
    pub gross_amount: Amount,
    pub merchant_amount: Amount,
    pub dividend_amount: Amount,
    pub status: SettlementStatus,
    pub payment_id: Option<PaymentId>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for admitting a merchant settlement.
#[derive(Debug, Clone)]
pub struct NewMerchantSettlement {
    pub deposit_reference: String,
    pub merchant_id: String,
    pub merchant_address: String,
    pub split: Split,
}

impl NewMerchantSettlement {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.deposit_reference.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Deposit reference cannot be empty".into(),
            ));
        }
        if self.merchant_id.trim().is_empty() || self.merchant_address.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Merchant id and address are required".into(),
            ));
        }
        if self.split.merchant_amount.is_zero() {
            return Err(DomainError::ValidationError(
                "Merchant share rounds to zero".into(),
            ));
        }
        Ok(())
    }

    pub fn to_settlement(&self) -> MerchantSettlement {
        MerchantSettlement {
            id: SettlementId::new(),
            deposit_reference: self.deposit_reference.clone(),
            merchant_id: self.merchant_id.clone(),
            merchant_address: self.merchant_address.clone(),
            gross_amount: self.split.gross,
            merchant_amount: self.split.merchant_amount,
            dividend_amount: self.split.dividend_amount,
            status: SettlementStatus::Pending,
            payment_id: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Accumulated dividend balance of one merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendPool {
    pub merchant_id: String,
    pub balance: Amount,
    pub updated_at: DateTime<Utc>,
}
