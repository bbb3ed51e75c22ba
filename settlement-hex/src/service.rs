//! Settlement Application Service
//!
//! Facade over admission, dispatch, status, deposits, merchant settlement and
//! reconciliation. Contains NO infrastructure logic; the ledger and the
//! payment network are injected ports.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Notify;

use settlement_types::{
    AdmitBatchRequest, AdmitBatchResponse, AppError, BatchStatusView, BatchTaskId, BatchStatus,
    ClaimRequest, Deposit, DepositId, DepositStatus, DividendPool, GatewayPaymentId,
    IncompletePayment, LedgerStore, NewDeposit, NewMerchantSettlement, Payment, PaymentGateway,
    PaymentOwner, PaymentStatus, ReconciliationReport, RecordDepositRequest,
    RecordDepositResponse, RepoError, SettleMerchantRequest, SettlementResponse,
    SettlementStatus, SplitRatios, split,
};

use crate::{BatchTaskManager, DispatchWorker, SettlementOrchestrator, StatusAggregator};

/// Stuck rows of each kind listed per reconciliation pass.
const RECONCILE_LIMIT: i64 = 100;

/// How long a batch run may go without a heartbeat before `resume` may take
/// its task over.
pub const DEFAULT_RESUME_STALE_AFTER: Duration = Duration::from_secs(300);

const CANCELLED: &str = "cancelled during reconciliation";

/// Application service for settlement operations.
///
/// Generic over the ledger and the payment network so adapters are injected
/// at compile time and swapped for in-memory doubles in tests.
pub struct SettlementService<L: LedgerStore, G: PaymentGateway> {
    ledger: Arc<L>,
    manager: BatchTaskManager<L>,
    orchestrator: SettlementOrchestrator<L, G>,
    aggregator: StatusAggregator<L>,
    ratios: SplitRatios,
    resume_stale_after: Duration,
    wake: Arc<Notify>,
}

impl<L: LedgerStore, G: PaymentGateway> SettlementService<L, G> {
    /// Creates a new service over the given ledger and payment network.
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, ratios: SplitRatios) -> Self {
        Self {
            manager: BatchTaskManager::new(ledger.clone()),
            orchestrator: SettlementOrchestrator::new(ledger.clone(), gateway),
            aggregator: StatusAggregator::new(ledger.clone()),
            ledger,
            ratios,
            resume_stale_after: DEFAULT_RESUME_STALE_AFTER,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Sets the heartbeat age after which `resume_batch` may take a task
    /// away from its run. Keep it above the gateway timeout.
    pub fn with_resume_stale_after(mut self, stale_after: Duration) -> Self {
        self.resume_stale_after = stale_after;
        self
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ratios(&self) -> SplitRatios {
        self.ratios
    }

    /// Builds the background worker that dispatches admitted batches.
    pub fn worker(&self, poll_interval: Duration) -> DispatchWorker<L, G> {
        DispatchWorker::new(
            self.ledger.clone(),
            self.orchestrator.clone(),
            self.wake.clone(),
            poll_interval,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────────

    /// Admits a fan-out and returns without waiting for its dispatch.
    ///
    /// A redelivered external batch id returns the existing task and does not
    /// dispatch again.
    pub async fn admit_and_dispatch(
        &self,
        req: AdmitBatchRequest,
    ) -> Result<AdmitBatchResponse, AppError> {
        let (task, already_existed) = self.manager.admit(req).await?;

        if !already_existed {
            self.wake.notify_one();
        }

        Ok(AdmitBatchResponse {
            task,
            already_existed,
        })
    }

    /// Gets the status rollup of a batch.
    pub async fn get_status(&self, id: BatchTaskId) -> Result<BatchStatusView, AppError> {
        self.aggregator.get_status(id).await
    }

    pub async fn get_status_by_external_id(
        &self,
        external_batch_id: &str,
    ) -> Result<BatchStatusView, AppError> {
        self.aggregator
            .get_status_by_external_id(external_batch_id)
            .await
    }

    /// Re-drives a batch stranded in `processing` and returns its new status.
    ///
    /// A task whose run is still heartbeating is a `Conflict`.
    pub async fn resume_batch(&self, id: BatchTaskId) -> Result<BatchStatusView, AppError> {
        match self.orchestrator.resume(id, self.resume_stale_after).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => {
                return Err(AppError::NotFound(format!("Batch task {}", id)));
            }
            Err(e) => return Err(e.into()),
        }
        self.aggregator.get_status(id).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Deposits
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a confirmed inbound deposit; idempotent on the gateway payment id.
    #[tracing::instrument(skip(self, req), fields(gateway_payment_id = %req.gateway_payment_id))]
    pub async fn record_deposit(
        &self,
        req: RecordDepositRequest,
    ) -> Result<RecordDepositResponse, AppError> {
        let new = NewDeposit {
            gateway_payment_id: req.gateway_payment_id,
            depositor_user_id: req.depositor_user_id,
            depositor_address: req.depositor_address,
            amount: req.amount,
            expires_at: req.expires_at,
        };
        new.validate()?;

        let (deposit, already_existed) = self.ledger.find_or_create_deposit(new).await?;
        Ok(RecordDepositResponse {
            deposit,
            already_existed,
        })
    }

    pub async fn get_deposit(&self, id: DepositId) -> Result<Deposit, AppError> {
        self.ledger
            .get_deposit(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Deposit {}", id))))
    }

    /// Pays an expired deposit back to its depositor, exactly once.
    #[tracing::instrument(skip(self), fields(deposit_id = %id))]
    pub async fn refund(&self, id: DepositId, caller_user_id: &str) -> Result<Deposit, AppError> {
        let deposit = self.get_deposit(id).await?;
        let address = deposit
            .check_refundable(caller_user_id, Utc::now())?
            .to_string();

        self.pay_out_deposit(
            &deposit,
            address,
            DepositStatus::Refunded,
            &[DepositStatus::Active, DepositStatus::Expired],
        )
        .await
    }

    /// Pays an active deposit out to a claimant, exactly once.
    #[tracing::instrument(skip(self, req), fields(deposit_id = %id))]
    pub async fn claim(&self, id: DepositId, req: ClaimRequest) -> Result<Deposit, AppError> {
        if req.claimant_user_id.trim().is_empty() || req.claimant_address.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Claimant user and address are required".into(),
            ));
        }

        let deposit = self.get_deposit(id).await?;
        deposit.check_claimable(Utc::now())?;

        tracing::info!(claimant = %req.claimant_user_id, "claiming deposit");
        self.pay_out_deposit(
            &deposit,
            req.claimant_address,
            DepositStatus::Claimed,
            &[DepositStatus::Active],
        )
        .await
    }

    /// Single-recipient dispatch guarded by the deposit's payout lock.
    ///
    /// The lock is a compare-and-set into `payout_pending`; whoever loses it
    /// gets a conflict and nothing is paid. A failed payout restores the prior
    /// status. A ledger outage mid-payout leaves the lock held; the deposit
    /// shows up in `reconcile` and `cancel_incomplete` releases it.
    async fn pay_out_deposit(
        &self,
        deposit: &Deposit,
        address: String,
        target: DepositStatus,
        expected: &[DepositStatus],
    ) -> Result<Deposit, AppError> {
        let previous = self
            .ledger
            .lock_deposit_for_payout(deposit.id, expected)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Deposit {} payout is already in progress or settled",
                    deposit.id
                ))
            })?;

        let memo = match target {
            DepositStatus::Refunded => format!("Refund of deposit {}", deposit.gateway_payment_id),
            _ => format!("Claim of deposit {}", deposit.gateway_payment_id),
        };
        let mut payment = Payment::new(
            PaymentOwner::Deposit(deposit.id),
            address,
            deposit.amount,
            memo,
        );

        if let Err(e) = self.ledger.insert_payment(&payment).await {
            self.release_deposit(deposit.id, previous).await;
            return Err(e.into());
        }

        let metadata = json!({
            "deposit_id": deposit.id,
            "gateway_payment_id": deposit.gateway_payment_id,
            "kind": target.as_str(),
        });
        self.orchestrator
            .drive_payment(&mut payment, &metadata)
            .await?;

        if payment.status == PaymentStatus::Completed {
            let settled = self
                .ledger
                .finish_deposit_payout(deposit.id, target, &payment)
                .await?;
            tracing::info!(deposit_id = %deposit.id, status = %settled.status, "deposit paid out");
            return Ok(settled);
        }

        self.release_deposit(deposit.id, previous).await;
        Err(AppError::Upstream(
            payment
                .error_message
                .unwrap_or_else(|| "payout did not complete".into()),
        ))
    }

    async fn release_deposit(&self, id: DepositId, restore: DepositStatus) {
        if let Err(e) = self.ledger.release_deposit(id, restore).await {
            tracing::error!(deposit_id = %id, error = %e, "could not release payout lock");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Merchant settlement
    // ─────────────────────────────────────────────────────────────────────────────

    /// Splits a merchant deposit, pays the merchant share and credits the
    /// dividend pool in the same ledger transaction as the completion.
    ///
    /// Idempotent on the deposit reference: a settlement that already left
    /// `pending` is returned as is. One stranded in `processing` by a ledger
    /// outage is failed by `cancel_incomplete` on its payout.
    #[tracing::instrument(skip(self, req), fields(deposit_reference = %req.deposit_reference, merchant_id = %req.merchant_id))]
    pub async fn settle_merchant(
        &self,
        req: SettleMerchantRequest,
    ) -> Result<SettlementResponse, AppError> {
        let parts = split(req.gross_amount, &self.ratios)?;
        let new = NewMerchantSettlement {
            deposit_reference: req.deposit_reference,
            merchant_id: req.merchant_id,
            merchant_address: req.merchant_address,
            split: parts,
        };
        new.validate()?;

        let (settlement, _) = self.ledger.find_or_create_settlement(new).await?;

        if settlement.status != SettlementStatus::Pending
            || !self.ledger.claim_settlement(settlement.id).await?
        {
            let current = self
                .ledger
                .get_settlement(settlement.id)
                .await?
                .unwrap_or(settlement);
            let dividend_pool = self.ledger.get_dividend_pool(&current.merchant_id).await?;
            return Ok(SettlementResponse {
                settlement: current,
                dividend_pool,
            });
        }

        let mut payment = Payment::new(
            PaymentOwner::Settlement(settlement.id),
            settlement.merchant_address.clone(),
            settlement.merchant_amount,
            format!("Settlement of deposit {}", settlement.deposit_reference),
        );
        self.ledger.insert_payment(&payment).await?;

        let metadata = json!({
            "settlement_id": settlement.id,
            "merchant_id": settlement.merchant_id,
            "deposit_reference": settlement.deposit_reference,
        });
        self.orchestrator
            .drive_payment(&mut payment, &metadata)
            .await?;

        if payment.status == PaymentStatus::Completed {
            let (settlement, pool) = self
                .ledger
                .complete_settlement(settlement.id, &payment)
                .await?;
            tracing::info!(
                merchant = %settlement.merchant_amount,
                dividend = %settlement.dividend_amount,
                pool = %pool.balance,
                "merchant settled"
            );
            return Ok(SettlementResponse {
                settlement,
                dividend_pool: Some(pool),
            });
        }

        let error = payment
            .error_message
            .as_deref()
            .unwrap_or("payout did not complete");
        let settlement = self.ledger.fail_settlement(settlement.id, error).await?;
        let dividend_pool = self.ledger.get_dividend_pool(&settlement.merchant_id).await?;
        Ok(SettlementResponse {
            settlement,
            dividend_pool,
        })
    }

    pub async fn dividend_pool(&self, merchant_id: &str) -> Result<DividendPool, AppError> {
        self.ledger
            .get_dividend_pool(merchant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dividend pool for merchant {}", merchant_id)))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists payments the network still holds open, together with batches,
    /// settlements and deposits whose payout never reached a terminal status.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, AppError> {
        let open = self
            .orchestrator
            .gateway()
            .list_incomplete()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let mut incomplete_payments = Vec::with_capacity(open.len());
        for id in open {
            let ledger_payment = self.ledger.find_payment_by_external_id(id.as_str()).await?;
            incomplete_payments.push(IncompletePayment {
                gateway_payment_id: id.into_string(),
                ledger_payment,
            });
        }

        let stuck_batches = self
            .ledger
            .list_batch_tasks_by_status(BatchStatus::Processing, RECONCILE_LIMIT)
            .await?;
        let stuck_settlements = self
            .ledger
            .list_settlements_by_status(SettlementStatus::Processing, RECONCILE_LIMIT)
            .await?;
        let stuck_deposits = self
            .ledger
            .list_deposits_by_status(DepositStatus::PayoutPending, RECONCILE_LIMIT)
            .await?;

        Ok(ReconciliationReport {
            incomplete_payments,
            stuck_batches,
            stuck_settlements,
            stuck_deposits,
        })
    }

    /// Cancels an open payment at the network and fails its ledger row.
    ///
    /// A settlement owning the failed payout is failed; a deposit owning it
    /// gets its payout lock released back to `active`. Batches are left to
    /// `resume_batch`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_incomplete(
        &self,
        gateway_payment_id: &str,
    ) -> Result<IncompletePayment, AppError> {
        if gateway_payment_id.trim().is_empty() {
            return Err(AppError::BadRequest("Payment id cannot be empty".into()));
        }

        self.orchestrator
            .gateway()
            .cancel(&GatewayPaymentId::new(gateway_payment_id))
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        let mut ledger_payment = self
            .ledger
            .find_payment_by_external_id(gateway_payment_id)
            .await?;

        if let Some(payment) = ledger_payment.as_mut() {
            if !payment.status.is_terminal() {
                payment.record_failed(CANCELLED)?;
                self.ledger.update_payment(payment).await?;
            }
            if payment.status == PaymentStatus::Failed {
                self.release_owner(payment).await?;
            }
        }

        tracing::info!(known = ledger_payment.is_some(), "incomplete payment cancelled");
        Ok(IncompletePayment {
            gateway_payment_id: gateway_payment_id.to_string(),
            ledger_payment,
        })
    }

    /// Returns a settlement or deposit stranded behind a failed payout to a
    /// state its normal operations accept again.
    async fn release_owner(&self, payment: &Payment) -> Result<(), AppError> {
        match payment.owner {
            PaymentOwner::Settlement(id) => {
                let stranded = self
                    .ledger
                    .get_settlement(id)
                    .await?
                    .is_some_and(|s| s.status == SettlementStatus::Processing);
                if stranded {
                    self.ledger.fail_settlement(id, CANCELLED).await?;
                    tracing::info!(settlement_id = %id, "stranded settlement failed");
                }
            }
            PaymentOwner::Deposit(id) => {
                // Only the latest payout attempt holds the lock.
                let latest = self.ledger.list_payments(&payment.owner).await?.pop();
                if latest.is_some_and(|p| p.id == payment.id) {
                    self.ledger.release_deposit(id, DepositStatus::Active).await?;
                    tracing::info!(deposit_id = %id, "deposit payout lock released");
                }
            }
            PaymentOwner::Batch(_) => {}
        }
        Ok(())
    }
}
