//! Background dispatch of admitted batches.
//!
//! The `pending` task row is the job record. The worker wakes immediately
//! when admission signals it and otherwise polls, so tasks admitted before a
//! restart are still picked up. Each task runs on its own tokio task; the
//! orchestrator's compare-and-set claim keeps a task from running twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, instrument};

use settlement_types::{BatchStatus, LedgerStore, PaymentGateway};

use crate::SettlementOrchestrator;

/// Pending tasks fetched per poll.
const BATCH_SIZE: i64 = 10;

pub struct DispatchWorker<L: LedgerStore, G: PaymentGateway> {
    ledger: Arc<L>,
    orchestrator: SettlementOrchestrator<L, G>,
    wake: Arc<Notify>,
    poll_interval: Duration,
}

impl<L: LedgerStore, G: PaymentGateway> DispatchWorker<L, G> {
    pub fn new(
        ledger: Arc<L>,
        orchestrator: SettlementOrchestrator<L, G>,
        wake: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            orchestrator,
            wake,
            poll_interval,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Starting dispatch worker");
        let mut running = JoinSet::new();
        loop {
            self.spawn_pending(&mut running).await;

            while let Some(done) = running.try_join_next() {
                if let Err(e) = done {
                    error!("Dispatch task panicked: {}", e);
                }
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    /// Dispatches every currently pending task and waits for all of them.
    ///
    /// Returns the number of tasks picked up.
    pub async fn run_once(&self) -> usize {
        let mut running = JoinSet::new();
        let picked = self.spawn_pending(&mut running).await;
        while let Some(done) = running.join_next().await {
            if let Err(e) = done {
                error!("Dispatch task panicked: {}", e);
            }
        }
        picked
    }

    async fn spawn_pending(&self, running: &mut JoinSet<()>) -> usize {
        match self
            .ledger
            .list_batch_tasks_by_status(BatchStatus::Pending, BATCH_SIZE)
            .await
        {
            Ok(tasks) => {
                if !tasks.is_empty() {
                    info!("Dispatching {} pending batches", tasks.len());
                }
                let picked = tasks.len();
                for task in tasks {
                    let orchestrator = self.orchestrator.clone();
                    running.spawn(async move { orchestrator.run(task.id).await });
                }
                picked
            }
            Err(e) => {
                error!("Failed to fetch pending batches: {}", e);
                0
            }
        }
    }
}
