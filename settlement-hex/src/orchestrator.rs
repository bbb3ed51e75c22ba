//! Settlement Orchestrator.
//!
//! Drives each payout through the network's three-phase protocol
//! (create -> submit -> complete), persisting the payment after every phase,
//! and rolls a batch up into its terminal status.
//!
//! Gateway errors never escape: they are recorded on the payment, which ends
//! `failed`, and the batch moves on to the next recipient. Only ledger errors
//! are returned, and they abort the run.
//!
//! A batch run holds a lease on its task. Payment writes are fenced by the
//! lease, so a run that has been taken over cannot touch the network or the
//! ledger again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use settlement_types::{
    BatchStatus, BatchTask, BatchTaskId, GatewayError, GatewayPaymentId, GatewayPaymentRequest,
    LedgerStore, Payment, PaymentGateway, PaymentOwner, PaymentStatus, RecipientShare, RepoError,
    RunLease,
};

#[derive(Debug, Clone, Copy)]
enum Phase {
    Create,
    Submit,
    Complete,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Submit => "submit",
            Phase::Complete => "complete",
        }
    }
}

pub struct SettlementOrchestrator<L: LedgerStore, G: PaymentGateway> {
    ledger: Arc<L>,
    gateway: Arc<G>,
}

impl<L: LedgerStore, G: PaymentGateway> Clone for SettlementOrchestrator<L, G> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<L: LedgerStore, G: PaymentGateway> SettlementOrchestrator<L, G> {
    pub fn new(ledger: Arc<L>, gateway: Arc<G>) -> Self {
        Self { ledger, gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Batch dispatch
    // ─────────────────────────────────────────────────────────────────────────────

    /// Claims a `pending` task under a fresh lease and dispatches all of its
    /// recipients.
    ///
    /// A task whose recipient lines do not match its count is marked
    /// `failed` before any run claims it. Returns `None` when the task is not
    /// pending.
    #[tracing::instrument(skip(self), fields(batch_task_id = %id))]
    pub async fn dispatch(&self, id: BatchTaskId) -> Result<Option<BatchStatus>, RepoError> {
        let task = self
            .ledger
            .get_batch_task(id)
            .await?
            .ok_or(RepoError::NotFound)?;

        if task.status != BatchStatus::Pending {
            debug!(status = %task.status, "task not pending; skipping");
            return Ok(None);
        }

        let recipients = self.ledger.list_batch_recipients(task.id).await?;
        if let Err(e) = check_recipients(&task, &recipients) {
            error!(error = %e, "rejecting batch before dispatch");
            self.ledger
                .finish_batch_task(task.id, BatchStatus::Failed, None)
                .await?;
            return Ok(Some(BatchStatus::Failed));
        }

        let lease = RunLease::new(task.id);
        if !self.ledger.claim_batch_task(&lease).await? {
            debug!("task claimed by another run; skipping");
            return Ok(None);
        }

        self.run_recipients(&task, &recipients, &lease).await.map(Some)
    }

    /// Re-drives a task left in `processing` by an aborted run.
    ///
    /// The task is taken over only if its current run has not written since
    /// `stale_after` ago; a live run makes this a `Conflict`.
    #[tracing::instrument(skip(self), fields(batch_task_id = %id))]
    pub async fn resume(
        &self,
        id: BatchTaskId,
        stale_after: Duration,
    ) -> Result<BatchStatus, RepoError> {
        let task = self
            .ledger
            .get_batch_task(id)
            .await?
            .ok_or(RepoError::NotFound)?;

        if task.status != BatchStatus::Processing {
            return Err(RepoError::Conflict(format!(
                "batch task {} is {}, only processing tasks can be resumed",
                task.id, task.status
            )));
        }

        let recipients = self.ledger.list_batch_recipients(task.id).await?;
        check_recipients(&task, &recipients)?;

        let stale_before = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let lease = RunLease::new(task.id);
        if !self.ledger.take_over_batch_task(&lease, stale_before).await? {
            return Err(RepoError::Conflict(format!(
                "batch task {} is still being dispatched (last heartbeat {})",
                task.id,
                task.heartbeat_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "unknown".into())
            )));
        }

        info!(run_id = %lease.run_id, "resuming batch");
        self.run_recipients(&task, &recipients, &lease).await
    }

    /// Dispatches a task and logs the outcome of the run itself.
    ///
    /// Once a run holds the task, an error leaves it `processing` with its
    /// payments as last persisted, for `resume` or reconciliation.
    pub async fn run(&self, id: BatchTaskId) {
        match self.dispatch(id).await {
            Ok(Some(status)) => debug!(batch_task_id = %id, %status, "dispatch run finished"),
            Ok(None) => {}
            Err(RepoError::NotFound) => {
                warn!(batch_task_id = %id, "batch task vanished before dispatch");
            }
            Err(e) => {
                error!(batch_task_id = %id, error = %e, "dispatch aborted");
            }
        }
    }

    async fn run_recipients(
        &self,
        task: &BatchTask,
        recipients: &[RecipientShare],
        lease: &RunLease,
    ) -> Result<BatchStatus, RepoError> {
        let owner = PaymentOwner::Batch(task.id);

        // Rows from a prior partial attempt, one per recipient; an open row
        // takes precedence over a failed one.
        let mut prior: HashMap<String, Payment> = HashMap::new();
        for payment in self.ledger.list_payments(&owner).await? {
            let keep_existing = prior
                .get(&payment.recipient_address)
                .is_some_and(|p| p.status != PaymentStatus::Failed);
            if !keep_existing {
                prior.insert(payment.recipient_address.clone(), payment);
            }
        }

        let memo = format!("Payout for batch {}", task.external_batch_id);
        let metadata = json!({
            "batch_task_id": task.id,
            "external_batch_id": task.external_batch_id,
            "deposit_reference": task.deposit_reference,
        });

        let (mut completed, mut failed) = (0usize, 0usize);

        for share in recipients {
            let mut payment = match prior.remove(&share.recipient_address) {
                Some(p) if p.status == PaymentStatus::Completed => {
                    completed += 1;
                    continue;
                }
                // Failed payments are never resurrected.
                Some(p) if p.status == PaymentStatus::Failed => {
                    failed += 1;
                    continue;
                }
                Some(p) => {
                    debug!(payment_id = %p.id, status = %p.status, "reusing open payment");
                    p
                }
                None => {
                    let p = Payment::new(
                        owner,
                        share.recipient_address.clone(),
                        share.amount,
                        memo.clone(),
                    );
                    self.ledger.renew_batch_lease(lease).await?;
                    self.ledger.insert_payment(&p).await?;
                    p
                }
            };

            self.drive(&mut payment, &metadata, Some(lease)).await?;

            match payment.status {
                PaymentStatus::Completed => completed += 1,
                PaymentStatus::Failed => failed += 1,
                other => {
                    return Err(RepoError::Integrity(format!(
                        "payment {} stopped in {}",
                        payment.id, other
                    )));
                }
            }
        }

        let status = BatchStatus::from_outcome(completed, failed);
        self.ledger
            .finish_batch_task(task.id, status, Some(lease))
            .await?;

        info!(
            batch_task_id = %task.id,
            %status,
            completed,
            failed,
            "batch dispatched"
        );
        Ok(status)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Single payment
    // ─────────────────────────────────────────────────────────────────────────────

    /// Moves a non-terminal payment to `completed` or `failed`.
    ///
    /// Resumes from the persisted phase: no network id yet means create,
    /// `created` means submit, `submitted` means complete. The payment row
    /// must already exist in the ledger and its owner must hold its own
    /// payout lock.
    pub async fn drive_payment(
        &self,
        payment: &mut Payment,
        metadata: &serde_json::Value,
    ) -> Result<(), RepoError> {
        self.drive(payment, metadata, None).await
    }

    /// With a lease, every network call is preceded by a lease check and
    /// every write is fenced by it.
    #[tracing::instrument(
        skip(self, payment, metadata, lease),
        fields(payment_id = %payment.id, recipient = %payment.recipient_address)
    )]
    async fn drive(
        &self,
        payment: &mut Payment,
        metadata: &serde_json::Value,
        lease: Option<&RunLease>,
    ) -> Result<(), RepoError> {
        if payment.status.is_terminal() {
            return Ok(());
        }

        let gateway_id = match payment.external_payment_id.clone() {
            Some(id) => GatewayPaymentId::new(id),
            None => {
                let req = GatewayPaymentRequest {
                    recipient: payment.recipient_address.clone(),
                    amount: payment.amount,
                    memo: payment.memo.clone(),
                    metadata: metadata.clone(),
                };
                self.hold(lease).await?;
                match self.gateway.create(req).await {
                    Ok(id) => {
                        payment.record_created(id.as_str().to_string())?;
                        self.persist(payment, lease).await?;
                        id
                    }
                    Err(e) => return self.record_failure(payment, Phase::Create, e, lease).await,
                }
            }
        };

        if payment.status == PaymentStatus::Created {
            self.hold(lease).await?;
            match self.gateway.submit(&gateway_id).await {
                Ok(txid) => {
                    payment.record_submitted(txid)?;
                    self.persist(payment, lease).await?;
                }
                Err(e) => return self.record_failure(payment, Phase::Submit, e, lease).await,
            }
        }

        let Some(txid) = payment.txid.clone() else {
            let err = GatewayError::InvalidResponse("submitted without a txid".into());
            return self.record_failure(payment, Phase::Complete, err, lease).await;
        };

        self.hold(lease).await?;
        match self.gateway.complete(&gateway_id, &txid).await {
            Ok(ack) => {
                payment.txid = Some(ack.txid);
                payment.record_completed()?;
                self.persist(payment, lease).await?;
                debug!(%gateway_id, "payment completed");
                Ok(())
            }
            Err(e) => self.record_failure(payment, Phase::Complete, e, lease).await,
        }
    }

    async fn hold(&self, lease: Option<&RunLease>) -> Result<(), RepoError> {
        match lease {
            Some(lease) => self.ledger.renew_batch_lease(lease).await,
            None => Ok(()),
        }
    }

    async fn persist(&self, payment: &Payment, lease: Option<&RunLease>) -> Result<(), RepoError> {
        match lease {
            Some(lease) => self.ledger.update_leased_payment(lease, payment).await,
            None => self.ledger.update_payment(payment).await,
        }
    }

    async fn record_failure(
        &self,
        payment: &mut Payment,
        phase: Phase,
        err: GatewayError,
        lease: Option<&RunLease>,
    ) -> Result<(), RepoError> {
        warn!(
            payment_id = %payment.id,
            recipient = %payment.recipient_address,
            phase = phase.as_str(),
            error = %err,
            "payment failed"
        );
        payment.record_failed(format!("{} failed: {}", phase.as_str(), err))?;
        self.persist(payment, lease).await
    }
}

/// The recipient lines must match the count recorded at admission.
fn check_recipients(task: &BatchTask, recipients: &[RecipientShare]) -> Result<(), RepoError> {
    if recipients.len() as i64 != task.recipient_count {
        return Err(RepoError::Integrity(format!(
            "batch task {} expects {} recipients, ledger holds {}",
            task.id,
            task.recipient_count,
            recipients.len()
        )));
    }
    Ok(())
}
