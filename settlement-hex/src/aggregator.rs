//! Status Aggregator: read-only rollup of a batch for client polling.

use std::sync::Arc;

use settlement_types::{
    AppError, BatchStatusView, BatchTask, BatchTaskId, LedgerStore, PaymentOwner,
};

pub struct StatusAggregator<L: LedgerStore> {
    ledger: Arc<L>,
}

impl<L: LedgerStore> Clone for StatusAggregator<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<L: LedgerStore> StatusAggregator<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Task, payment counts by status, and the payments themselves.
    pub async fn get_status(&self, id: BatchTaskId) -> Result<BatchStatusView, AppError> {
        let task = self
            .ledger
            .get_batch_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Batch task {}", id)))?;

        self.view(task).await
    }

    pub async fn get_status_by_external_id(
        &self,
        external_batch_id: &str,
    ) -> Result<BatchStatusView, AppError> {
        let task = self
            .ledger
            .find_batch_task_by_external_id(external_batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Batch {}", external_batch_id)))?;

        self.view(task).await
    }

    async fn view(&self, task: BatchTask) -> Result<BatchStatusView, AppError> {
        let owner = PaymentOwner::Batch(task.id);
        let counts = self.ledger.count_payments_by_status(&owner).await?;
        let payments = self.ledger.list_payments(&owner).await?;

        Ok(BatchStatusView {
            task,
            counts,
            payments,
        })
    }
}
