//! Batch Task Manager.
//!
//! Admission is the sole idempotency boundary against redelivered deposit
//! confirmations: one external batch id maps to exactly one task row.

use std::sync::Arc;

use settlement_types::{AdmitBatchRequest, AppError, BatchTask, LedgerStore, NewBatchTask};

/// Admits fan-out units of work into the ledger.
pub struct BatchTaskManager<L: LedgerStore> {
    ledger: Arc<L>,
}

impl<L: LedgerStore> Clone for BatchTaskManager<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<L: LedgerStore> BatchTaskManager<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Finds or creates the task for `req.external_batch_id`.
    ///
    /// Returns `(task, already_existed)`. A concurrent admitter that loses the
    /// race gets the winner's row back, never an error.
    #[tracing::instrument(skip(self, req), fields(external_batch_id = %req.external_batch_id))]
    pub async fn admit(&self, req: AdmitBatchRequest) -> Result<(BatchTask, bool), AppError> {
        let new = NewBatchTask::new(
            req.external_batch_id,
            req.initiating_user_id,
            req.deposit_reference,
            req.recipients,
            req.metadata,
        )?;

        let (task, existed) = self.ledger.find_or_create_batch_task(new).await?;

        if existed {
            tracing::info!(batch_task_id = %task.id, status = %task.status, "batch already admitted");
        } else {
            tracing::info!(
                batch_task_id = %task.id,
                recipients = task.recipient_count,
                total = %task.total_amount,
                "batch admitted"
            );
        }

        Ok((task, existed))
    }
}
