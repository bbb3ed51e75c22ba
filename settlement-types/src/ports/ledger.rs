//! Ledger store port trait.
//!
//! This is the persistence port of the hexagonal architecture. Adapters
//! (SQLite, in-memory test doubles) implement it; nothing in the application
//! layer holds process-wide state.

use chrono::{DateTime, Utc};

use crate::domain::{
    BatchStatus, BatchTask, BatchTaskId, Deposit, DepositId, DepositStatus, DividendPool,
    MerchantSettlement, NewBatchTask, NewDeposit, NewMerchantSettlement, Payment, PaymentCounts,
    PaymentOwner, RecipientShare, RunLease, SettlementId, SettlementStatus,
};
use crate::error::RepoError;

/// The ledger of batch tasks, payments, settlements and deposits.
///
/// Find-or-create operations are the idempotency boundary: under concurrent
/// calls with the same unique key exactly one row results and every caller
/// gets that row back. Multi-row writes are atomic.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Batch Tasks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts the task and its recipient lines atomically unless a task with
    /// the same external batch id exists. Returns `(task, already_existed)`.
    async fn find_or_create_batch_task(
        &self,
        new: NewBatchTask,
    ) -> Result<(BatchTask, bool), RepoError>;

    async fn get_batch_task(&self, id: BatchTaskId) -> Result<Option<BatchTask>, RepoError>;

    async fn find_batch_task_by_external_id(
        &self,
        external_batch_id: &str,
    ) -> Result<Option<BatchTask>, RepoError>;

    /// Recipient lines in dispatch order.
    async fn list_batch_recipients(
        &self,
        id: BatchTaskId,
    ) -> Result<Vec<RecipientShare>, RepoError>;

    /// Compare-and-set `pending -> processing`, storing the lease and a
    /// fresh heartbeat. `false` when the task is not pending.
    async fn claim_batch_task(&self, lease: &RunLease) -> Result<bool, RepoError>;

    /// Hands a `processing` task to a new run, but only if the holding run
    /// has not written since `stale_before`. `false` when the lease is live.
    async fn take_over_batch_task(
        &self,
        lease: &RunLease,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepoError>;

    /// Refreshes the heartbeat. `Conflict` once the lease has been lost.
    async fn renew_batch_lease(&self, lease: &RunLease) -> Result<(), RepoError>;

    /// Writes a terminal status and `completed_at`.
    ///
    /// With a lease the task must be `processing` under that lease; without
    /// one it must still be `pending` (a task rejected before any run).
    async fn finish_batch_task(
        &self,
        id: BatchTaskId,
        status: BatchStatus,
        lease: Option<&RunLease>,
    ) -> Result<(), RepoError>;

    async fn list_batch_tasks_by_status(
        &self,
        status: BatchStatus,
        limit: i64,
    ) -> Result<Vec<BatchTask>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts a payment. A second non-failed payment for the same
    /// `(owner, recipient)` is a `Conflict`.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepoError>;

    /// Persists the mutable fields of an existing payment.
    async fn update_payment(&self, payment: &Payment) -> Result<(), RepoError>;

    /// `update_payment` fenced by a batch lease: in one transaction the lease
    /// is checked and renewed, then the payment written. `Conflict` if the
    /// lease was lost.
    async fn update_leased_payment(
        &self,
        lease: &RunLease,
        payment: &Payment,
    ) -> Result<(), RepoError>;

    /// Payments of one owner in insertion order.
    async fn list_payments(&self, owner: &PaymentOwner) -> Result<Vec<Payment>, RepoError>;

    async fn find_payment_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, RepoError>;

    async fn count_payments_by_status(
        &self,
        owner: &PaymentOwner,
    ) -> Result<PaymentCounts, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Merchant Settlements (pool increment MUST be atomic with completion)
    // ─────────────────────────────────────────────────────────────────────────────

    async fn find_or_create_settlement(
        &self,
        new: NewMerchantSettlement,
    ) -> Result<(MerchantSettlement, bool), RepoError>;

    async fn get_settlement(&self, id: SettlementId)
    -> Result<Option<MerchantSettlement>, RepoError>;

    /// Compare-and-set `pending -> processing`.
    async fn claim_settlement(&self, id: SettlementId) -> Result<bool, RepoError>;

    /// In one transaction: settlement -> `completed` with its payment, and the
    /// merchant's dividend pool credited with the dividend amount.
    async fn complete_settlement(
        &self,
        id: SettlementId,
        payment: &Payment,
    ) -> Result<(MerchantSettlement, DividendPool), RepoError>;

    async fn fail_settlement(
        &self,
        id: SettlementId,
        error: &str,
    ) -> Result<MerchantSettlement, RepoError>;

    async fn get_dividend_pool(&self, merchant_id: &str)
    -> Result<Option<DividendPool>, RepoError>;

    async fn list_settlements_by_status(
        &self,
        status: SettlementStatus,
        limit: i64,
    ) -> Result<Vec<MerchantSettlement>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Deposits (refund / claim are exactly-once)
    // ─────────────────────────────────────────────────────────────────────────────

    async fn find_or_create_deposit(&self, new: NewDeposit) -> Result<(Deposit, bool), RepoError>;

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, RepoError>;

    async fn list_deposits_by_status(
        &self,
        status: DepositStatus,
        limit: i64,
    ) -> Result<Vec<Deposit>, RepoError>;

    /// Compare-and-set from any of `expected` to `payout_pending`. Returns
    /// the status it replaced, or `None` if the deposit was not in `expected`.
    async fn lock_deposit_for_payout(
        &self,
        id: DepositId,
        expected: &[DepositStatus],
    ) -> Result<Option<DepositStatus>, RepoError>;

    /// `payout_pending -> status` storing the payout's gateway id and txid.
    async fn finish_deposit_payout(
        &self,
        id: DepositId,
        status: DepositStatus,
        payment: &Payment,
    ) -> Result<Deposit, RepoError>;

    /// `payout_pending -> restore` after a failed payout.
    async fn release_deposit(&self, id: DepositId, restore: DepositStatus)
    -> Result<(), RepoError>;
}
