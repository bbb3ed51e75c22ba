//! Batch task domain model.
//!
//! A batch task is one fan-out dispatch: a single confirmed deposit turned
//! into an ordered list of payouts. The row doubles as the durable job record
//! that a dispatch worker picks up.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::amount::Amount;
use crate::error::DomainError;

define_id!(
    /// Unique identifier for a BatchTask.
    BatchTaskId
);

define_id!(
    /// Identifies one dispatch run of a batch task.
    RunId
);

/// A dispatch run's exclusive hold on a `processing` task.
///
/// The ledger accepts payment writes and the terminal status only from the
/// run whose id is stored on the task. Every accepted write refreshes the
/// heartbeat; a lease whose heartbeat went stale may be taken over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLease {
    pub task_id: BatchTaskId,
    pub run_id: RunId,
}

impl RunLease {
    /// A fresh lease for a new run of `task_id`.
    pub fn new(task_id: BatchTaskId) -> Self {
        Self {
            task_id,
            run_id: RunId::new(),
        }
    }
}

/// Lifecycle of a batch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PartialCompleted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartialCompleted => "partial_completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::PartialCompleted
        )
    }

    /// Rolls up per-recipient outcomes into the task's terminal status.
    pub fn from_outcome(completed: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Completed
        } else if completed == 0 {
            Self::Failed
        } else {
            Self::PartialCompleted
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "partial_completed" => Ok(Self::PartialCompleted),
            other => Err(DomainError::UnknownStatus {
                entity: "batch task",
                value: other.to_string(),
            }),
        }
    }
}

/// One payout line of a batch, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientShare {
    pub recipient_address: String,
    pub amount: Amount,
}

/// A tracked fan-out unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTask {
    pub id: BatchTaskId,
    /// Caller-supplied key; unique across all tasks.
    pub external_batch_id: String,
    pub initiating_user_id: Option<String>,
    /// Reference to the deposit that triggered the fan-out.
    pub deposit_reference: Option<String>,
    pub total_amount: Amount,
    pub recipient_count: i64,
    pub status: BatchStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Run currently holding the task, set once it is claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Last sign of life from the holding run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl BatchTask {
    /// True when the holding run has not written since `stale_before`.
    pub fn lease_is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.heartbeat_at.is_none_or(|at| at <= stale_before)
    }
}

/// Admission input for a new batch task.
#[derive(Debug, Clone)]
pub struct NewBatchTask {
    pub external_batch_id: String,
    pub initiating_user_id: Option<String>,
    pub deposit_reference: Option<String>,
    pub total_amount: Amount,
    pub recipients: Vec<RecipientShare>,
    pub metadata: serde_json::Value,
}

impl NewBatchTask {
    /// Validates the admission input and derives the task total.
    ///
    /// # Validation
    /// - External batch id cannot be empty
    /// - At least one recipient, each with a non-empty distinct address
    /// - Every amount is positive
    pub fn new(
        external_batch_id: String,
        initiating_user_id: Option<String>,
        deposit_reference: Option<String>,
        recipients: Vec<RecipientShare>,
        metadata: serde_json::Value,
    ) -> Result<Self, DomainError> {
        if external_batch_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "External batch id cannot be empty".into(),
            ));
        }
        if recipients.is_empty() {
            return Err(DomainError::ValidationError(
                "A batch needs at least one recipient".into(),
            ));
        }

        let mut seen = HashSet::new();
        for share in &recipients {
            if share.recipient_address.trim().is_empty() {
                return Err(DomainError::ValidationError(
                    "Recipient address cannot be empty".into(),
                ));
            }
            if share.amount.is_zero() {
                return Err(DomainError::ValidationError(format!(
                    "Amount for {} must be positive",
                    share.recipient_address
                )));
            }
            if !seen.insert(share.recipient_address.as_str()) {
                return Err(DomainError::ValidationError(format!(
                    "Duplicate recipient {}",
                    share.recipient_address
                )));
            }
        }

        let total_amount = Amount::sum(recipients.iter().map(|r| &r.amount))?;

        Ok(Self {
            external_batch_id,
            initiating_user_id,
            deposit_reference,
            total_amount,
            recipients,
            metadata,
        })
    }

    pub fn recipient_count(&self) -> i64 {
        self.recipients.len() as i64
    }

    /// Materializes the task row in `pending`.
    pub fn to_task(&self) -> BatchTask {
        BatchTask {
            id: BatchTaskId::new(),
            external_batch_id: self.external_batch_id.clone(),
            initiating_user_id: self.initiating_user_id.clone(),
            deposit_reference: self.deposit_reference.clone(),
            total_amount: self.total_amount,
            recipient_count: self.recipient_count(),
            status: BatchStatus::Pending,
            metadata: self.metadata.clone(),
            created_at: Utc::now(),
            completed_at: None,
            run_id: None,
            heartbeat_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(addr: &str, micros: i64) -> RecipientShare {
        RecipientShare {
            recipient_address: addr.to_string(),
            amount: Amount::from_micros(micros).unwrap(),
        }
    }

    #[test]
    fn test_new_batch_task_totals() {
        let new = NewBatchTask::new(
            "batch-1".into(),
            Some("user-1".into()),
            None,
            vec![share("a", 1_000_000), share("b", 2_500_000)],
            serde_json::json!({}),
        )
        .unwrap();

        assert_eq!(new.total_amount.micros(), 3_500_000);
        assert_eq!(new.recipient_count(), 2);
        assert_eq!(new.to_task().status, BatchStatus::Pending);
    }

    #[test]
    fn test_duplicate_recipient_rejected() {
        let result = NewBatchTask::new(
            "batch-1".into(),
            None,
            None,
            vec![share("a", 1), share("a", 2)],
            serde_json::Value::Null,
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let result = NewBatchTask::new("b".into(), None, None, vec![], serde_json::Value::Null);
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let result = NewBatchTask::new(
            "b".into(),
            None,
            None,
            vec![share("a", 0)],
            serde_json::Value::Null,
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_rollup() {
        assert_eq!(BatchStatus::from_outcome(3, 0), BatchStatus::Completed);
        assert_eq!(BatchStatus::from_outcome(0, 3), BatchStatus::Failed);
        assert_eq!(BatchStatus::from_outcome(2, 1), BatchStatus::PartialCompleted);
    }

    #[test]
    fn test_lease_staleness() {
        let mut task = NewBatchTask::new(
            "b".into(),
            None,
            None,
            vec![share("a", 1)],
            serde_json::Value::Null,
        )
        .unwrap()
        .to_task();
        let now = Utc::now();
        assert!(task.lease_is_stale(now));

        task.heartbeat_at = Some(now);
        assert!(task.lease_is_stale(now));
        assert!(!task.lease_is_stale(now - chrono::Duration::minutes(5)));
    }

    #[test]
    fn test_status_round_trip_and_rejection() {
        for status in [
            BatchStatus::Pending,
            BatchStatus::Processing,
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::PartialCompleted,
        ] {
            assert_eq!(status.as_str().parse::<BatchStatus>().unwrap(), status);
        }
        assert!(matches!(
            "PARTIAL".parse::<BatchStatus>(),
            Err(DomainError::UnknownStatus { .. })
        ));
    }
}
