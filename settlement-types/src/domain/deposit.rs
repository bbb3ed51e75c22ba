//! Deposit (U2A) domain model and its refund/claim guards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a Deposit.
    DepositId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Active,
    Expired,
    /// A refund or claim payout is in flight.
    PayoutPending,
    Claimed,
    Refunded,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::PayoutPending => "payout_pending",
            Self::Claimed => "claimed",
            Self::Refunded => "refunded",
        }
    }

    /// Refund or claim has fired or is firing.
    pub fn is_paid_out(&self) -> bool {
        matches!(self, Self::PayoutPending | Self::Claimed | Self::Refunded)
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "payout_pending" => Ok(Self::PayoutPending),
            "claimed" => Ok(Self::Claimed),
            "refunded" => Ok(Self::Refunded),
            other => Err(DomainError::UnknownStatus {
                entity: "deposit",
                value: other.to_string(),
            }),
        }
    }
}

/// A confirmed user deposit that can be claimed or, after expiry, refunded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    /// Gateway identifier of the inbound payment; unique.
    pub gateway_payment_id: String,
    pub depositor_user_id: String,
    /// Where refunds go; absent when the gateway did not report one.
    pub depositor_address: Option<String>,
    pub amount: Amount,
    pub status: DepositStatus,
    pub expires_at: DateTime<Utc>,
    pub payout_payment_id: Option<String>,
    pub payout_txid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    /// Checks refund preconditions and returns the payout address.
    ///
    /// Order matters: ownership first, then exactly-once, then timing.
    pub fn check_refundable(&self, caller: &str, now: DateTime<Utc>) -> Result<&str, DomainError> {
        if self.depositor_user_id != caller {
            return Err(DomainError::NotDepositor);
        }
        if self.status.is_paid_out() {
            return Err(DomainError::PayoutAlreadySettled(self.status));
        }
        if now <= self.expires_at {
            return Err(DomainError::NotYetExpired);
        }
        self.depositor_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or(DomainError::MissingPayoutAddress)
    }

    /// Checks claim preconditions.
    pub fn check_claimable(&self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_paid_out() {
            return Err(DomainError::PayoutAlreadySettled(self.status));
        }
        if self.status == DepositStatus::Expired || now > self.expires_at {
            return Err(DomainError::DepositExpired);
        }
        Ok(())
    }
}

/// Input for recording a confirmed deposit.
#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub gateway_payment_id: String,
    pub depositor_user_id: String,
    pub depositor_address: Option<String>,
    pub amount: Amount,
    pub expires_at: DateTime<Utc>,
}

impl NewDeposit {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.gateway_payment_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Gateway payment id cannot be empty".into(),
            ));
        }
        if self.depositor_user_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Depositor cannot be empty".into(),
            ));
        }
        if self.amount.is_zero() {
            return Err(DomainError::ValidationError(
                "Deposit amount must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn to_deposit(&self) -> Deposit {
        let now = Utc::now();
        Deposit {
            id: DepositId::new(),
            gateway_payment_id: self.gateway_payment_id.clone(),
            depositor_user_id: self.depositor_user_id.clone(),
            depositor_address: self.depositor_address.clone(),
            amount: self.amount,
            status: DepositStatus::Active,
            expires_at: self.expires_at,
            payout_payment_id: None,
            payout_txid: None,
            created_at: now,
            updated_at: now,
        }
    }
}
