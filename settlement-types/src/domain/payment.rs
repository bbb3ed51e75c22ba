//! Payment (A2U payout) domain model.
//!
//! Every outbound payout, whether part of a batch fan-out, a merchant
//! settlement or a deposit refund/claim, walks the same lifecycle:
//! `created -> submitted -> completed`, or `created|submitted -> failed`.
//! `completed` and `failed` are terminal and never left again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use super::batch::BatchTaskId;
use super::deposit::DepositId;
use super::settlement::SettlementId;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a Payment row.
    PaymentId
);

/// Status of a single payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Submitted,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Submitted)
                | (Self::Created, Self::Failed)
                | (Self::Submitted, Self::Completed)
                | (Self::Submitted, Self::Failed)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "submitted" => Ok(Self::Submitted),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::UnknownStatus {
                entity: "payment",
                value: other.to_string(),
            }),
        }
    }
}

/// The unit of work a payment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PaymentOwner {
    Batch(BatchTaskId),
    Settlement(SettlementId),
    Deposit(DepositId),
}

impl PaymentOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::Settlement(_) => "settlement",
            Self::Deposit(_) => "deposit",
        }
    }

    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            Self::Batch(id) => *id.as_uuid(),
            Self::Settlement(id) => *id.as_uuid(),
            Self::Deposit(id) => *id.as_uuid(),
        }
    }

    /// Rebuilds an owner from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: uuid::Uuid) -> Result<Self, DomainError> {
        match kind {
            "batch" => Ok(Self::Batch(BatchTaskId::from_uuid(id))),
            "settlement" => Ok(Self::Settlement(SettlementId::from_uuid(id))),
            "deposit" => Ok(Self::Deposit(DepositId::from_uuid(id))),
            other => Err(DomainError::UnknownStatus {
                entity: "payment owner",
                value: other.to_string(),
            }),
        }
    }
}

/// A single outbound payout tracked through the gateway protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub owner: PaymentOwner,
    /// Identifier issued by the payment network once `create` succeeds.
    pub external_payment_id: Option<String>,
    pub recipient_address: String,
    pub amount: Amount,
    pub memo: String,
    pub status: PaymentStatus,
    pub txid: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A fresh payment in `created`, not yet known to the gateway.
    pub fn new(owner: PaymentOwner, recipient_address: String, amount: Amount, memo: String) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            owner,
            external_payment_id: None,
            recipient_address,
            amount,
            memo,
            status: PaymentStatus::Created,
            txid: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn batch_task_id(&self) -> Option<BatchTaskId> {
        match self.owner {
            PaymentOwner::Batch(id) => Some(id),
            _ => None,
        }
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the gateway identifier returned by `create`.
    pub fn record_created(&mut self, external_payment_id: String) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Created {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: PaymentStatus::Created,
            });
        }
        self.external_payment_id = Some(external_payment_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_submitted(&mut self, txid: String) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Submitted)?;
        self.txid = Some(txid);
        Ok(())
    }

    pub fn record_completed(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Completed)
    }

    pub fn record_failed(&mut self, error: impl Into<String>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }
}

/// Payment counts by status for one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCounts {
    pub created: i64,
    pub submitted: i64,
    pub completed: i64,
    pub failed: i64,
}

impl PaymentCounts {
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        let mut counts = Self::default();
        for payment in payments {
            counts.add(payment.status, 1);
        }
        counts
    }

    pub fn add(&mut self, status: PaymentStatus, n: i64) {
        match status {
            PaymentStatus::Created => self.created += n,
            PaymentStatus::Submitted => self.submitted += n,
            PaymentStatus::Completed => self.completed += n,
            PaymentStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> i64 {
        self.created + self.submitted + self.completed + self.failed
    }

    pub fn terminal(&self) -> i64 {
        self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment::new(
            PaymentOwner::Batch(BatchTaskId::new()),
            "GADDR".into(),
            Amount::from_micros(1_000_000).unwrap(),
            "memo".into(),
        )
    }

    #[test]
    fn test_happy_lifecycle() {
        let mut p = payment();
        p.record_created("pi_123".into()).unwrap();
        p.record_submitted("tx_abc".into()).unwrap();
        p.record_completed().unwrap();

        assert_eq!(p.status, PaymentStatus::Completed);
        assert_eq!(p.external_payment_id.as_deref(), Some("pi_123"));
        assert_eq!(p.txid.as_deref(), Some("tx_abc"));
    }

    #[test]
    fn test_cannot_skip_submit() {
        let mut p = payment();
        let result = p.record_completed();
        assert!(matches!(result, Err(DomainError::InvalidTransition { .. })));
        assert_eq!(p.status, PaymentStatus::Created);
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut p = payment();
        p.record_failed("gateway rejected").unwrap();

        assert!(p.record_submitted("tx".into()).is_err());
        assert!(p.record_failed("again").is_err());
        assert_eq!(p.error_message.as_deref(), Some("gateway rejected"));
    }

    #[test]
    fn test_counts() {
        let mut a = payment();
        a.record_failed("x").unwrap();
        let b = payment();
        let counts = PaymentCounts::from_payments([&a, &b]);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.terminal(), 1);
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("settled".parse::<PaymentStatus>().is_err());
        assert!(PaymentOwner::from_parts("invoice", uuid::Uuid::new_v4()).is_err());
    }
}
