//! SQLite ledger adapter.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, SqlitePool};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use settlement_types::{
    BatchStatus, BatchTask, BatchTaskId, Deposit, DepositId, DepositStatus, DividendPool,
    LedgerStore, MerchantSettlement, NewBatchTask, NewDeposit, NewMerchantSettlement, Payment,
    PaymentCounts, PaymentOwner, PaymentStatus, RecipientShare, RepoError, RunLease, SettlementId,
    SettlementStatus,
};

use crate::types::{
    DbBatchTask, DbDeposit, DbDividendPool, DbPayment, DbRecipient, DbSettlement, DbStatus,
    DbStatusCount, parse_status,
};

const BATCH_SELECT: &str = r#"SELECT id, external_batch_id, initiating_user_id, deposit_reference, total_amount,
       recipient_count, status, metadata, created_at, completed_at, run_id, heartbeat_at
FROM batch_tasks"#;

const PAYMENT_SELECT: &str = r#"SELECT id, owner_kind, owner_id, external_payment_id, recipient_address, amount, memo,
       status, txid, error_message, created_at, updated_at
FROM payments"#;

const SETTLEMENT_SELECT: &str = r#"SELECT id, deposit_reference, merchant_id, merchant_address, gross_amount, merchant_amount,
       dividend_amount, status, payment_id, error_message, created_at, completed_at
FROM merchant_settlements"#;

const DEPOSIT_SELECT: &str = r#"SELECT id, gateway_payment_id, depositor_user_id, depositor_address, amount, status,
       expires_at, payout_payment_id, payout_txid, created_at, updated_at
FROM deposits"#;

fn db_err(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return RepoError::Conflict(db.message().to_string());
        }
    }
    RepoError::Database(e.to_string())
}

fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Heartbeats are compared as TEXT, so they use one fixed-width format.
fn heartbeat(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const RENEW_LEASE: &str = r#"UPDATE batch_tasks SET heartbeat_at = ?
WHERE id = ? AND status = 'processing' AND run_id = ?"#;

fn lease_lost(lease: &RunLease) -> RepoError {
    RepoError::Conflict(format!(
        "batch task {} is no longer held by run {}",
        lease.task_id, lease.run_id
    ))
}

/// Writes the mutable fields of a non-terminal payment.
async fn write_payment<'e, E>(executor: E, payment: &Payment) -> Result<(), RepoError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    // Terminal rows are immutable; the WHERE clause enforces it.
    let result = sqlx::query(
        r#"UPDATE payments
           SET external_payment_id = ?, status = ?, txid = ?, error_message = ?, updated_at = ?
           WHERE id = ? AND status NOT IN ('completed', 'failed')"#,
    )
    .bind(&payment.external_payment_id)
    .bind(payment.status.as_str())
    .bind(&payment.txid)
    .bind(&payment.error_message)
    .bind(payment.updated_at.to_rfc3339())
    .bind(payment.id.to_string())
    .execute(executor)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(RepoError::Conflict(format!(
            "payment {} is missing or already terminal",
            payment.id
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite ledger store.
pub struct SqliteRepo {
    pool: SqlitePool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &SqlitePool, sql: &str, name: &str) -> anyhow::Result<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_settlements.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        // Ensure on-disk SQLite target directory exists
        if !in_memory {
            if let Some(path) = database_url.strip_prefix("sqlite://") {
                let path = path.split('?').next().unwrap_or(path);
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database lives exactly as long as its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;
        run_migrations(&pool).await?;

        tracing::debug!(in_memory, "ledger store ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_settlement(&self, id: SettlementId) -> Result<MerchantSettlement, RepoError> {
        self.get_settlement(id).await?.ok_or(RepoError::NotFound)
    }

    async fn fetch_deposit(&self, id: DepositId) -> Result<Deposit, RepoError> {
        self.get_deposit(id).await?.ok_or(RepoError::NotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteRepo {
    async fn find_or_create_batch_task(
        &self,
        new: NewBatchTask,
    ) -> Result<(BatchTask, bool), RepoError> {
        let task = new.to_task();
        let id_str = task.id.to_string();

        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let inserted = sqlx::query(
            r#"INSERT INTO batch_tasks (id, external_batch_id, initiating_user_id, deposit_reference,
                   total_amount, recipient_count, status, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (external_batch_id) DO NOTHING"#,
        )
        .bind(&id_str)
        .bind(&task.external_batch_id)
        .bind(&task.initiating_user_id)
        .bind(&task.deposit_reference)
        .bind(task.total_amount.micros())
        .bind(task.recipient_count)
        .bind(task.status.as_str())
        .bind(task.metadata.to_string())
        .bind(task.created_at.to_rfc3339())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if inserted {
            for (position, share) in new.recipients.iter().enumerate() {
                sqlx::query(
                    r#"INSERT INTO batch_recipients (batch_task_id, position, recipient_address, amount)
                       VALUES (?, ?, ?, ?)"#,
                )
                .bind(&id_str)
                .bind(position as i64)
                .bind(&share.recipient_address)
                .bind(share.amount.micros())
                .execute(&mut *db_tx)
                .await
                .map_err(db_err)?;
            }
        }

        db_tx.commit().await.map_err(tx_err)?;

        if inserted {
            return Ok((task, false));
        }

        // Lost the race (or a redelivery): read back the winner's row.
        let existing = self
            .find_batch_task_by_external_id(&new.external_batch_id)
            .await?
            .ok_or_else(|| {
                RepoError::Integrity(format!(
                    "batch {} conflicted but cannot be read back",
                    new.external_batch_id
                ))
            })?;
        Ok((existing, true))
    }

    async fn get_batch_task(&self, id: BatchTaskId) -> Result<Option<BatchTask>, RepoError> {
        let row: Option<DbBatchTask> = sqlx::query_as(&format!("{BATCH_SELECT} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbBatchTask::into_domain).transpose()
    }

    async fn find_batch_task_by_external_id(
        &self,
        external_batch_id: &str,
    ) -> Result<Option<BatchTask>, RepoError> {
        let row: Option<DbBatchTask> =
            sqlx::query_as(&format!("{BATCH_SELECT} WHERE external_batch_id = ?"))
                .bind(external_batch_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(DbBatchTask::into_domain).transpose()
    }

    async fn list_batch_recipients(
        &self,
        id: BatchTaskId,
    ) -> Result<Vec<RecipientShare>, RepoError> {
        let rows: Vec<DbRecipient> = sqlx::query_as(
            r#"SELECT recipient_address, amount FROM batch_recipients
               WHERE batch_task_id = ? ORDER BY position ASC"#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbRecipient::into_domain).collect()
    }

    async fn claim_batch_task(&self, lease: &RunLease) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"UPDATE batch_tasks SET status = 'processing', run_id = ?, heartbeat_at = ?
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(lease.run_id.to_string())
        .bind(heartbeat(Utc::now()))
        .bind(lease.task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn take_over_batch_task(
        &self,
        lease: &RunLease,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"UPDATE batch_tasks SET run_id = ?, heartbeat_at = ?
               WHERE id = ? AND status = 'processing'
                 AND (heartbeat_at IS NULL OR heartbeat_at <= ?)"#,
        )
        .bind(lease.run_id.to_string())
        .bind(heartbeat(Utc::now()))
        .bind(lease.task_id.to_string())
        .bind(heartbeat(stale_before))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn renew_batch_lease(&self, lease: &RunLease) -> Result<(), RepoError> {
        let result = sqlx::query(RENEW_LEASE)
            .bind(heartbeat(Utc::now()))
            .bind(lease.task_id.to_string())
            .bind(lease.run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(lease_lost(lease));
        }
        Ok(())
    }

    async fn finish_batch_task(
        &self,
        id: BatchTaskId,
        status: BatchStatus,
        lease: Option<&RunLease>,
    ) -> Result<(), RepoError> {
        let result = match lease {
            Some(lease) => {
                sqlx::query(
                    r#"UPDATE batch_tasks SET status = ?, completed_at = ?
                       WHERE id = ? AND status = 'processing' AND run_id = ?"#,
                )
                .bind(status.as_str())
                .bind(now())
                .bind(id.to_string())
                .bind(lease.run_id.to_string())
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"UPDATE batch_tasks SET status = ?, completed_at = ?
                       WHERE id = ? AND status = 'pending'"#,
                )
                .bind(status.as_str())
                .bind(now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return match self.get_batch_task(id).await? {
                Some(task) => Err(RepoError::Conflict(format!(
                    "batch task {} is {} and not held by this run",
                    id, task.status
                ))),
                None => Err(RepoError::NotFound),
            };
        }
        Ok(())
    }

    async fn list_batch_tasks_by_status(
        &self,
        status: BatchStatus,
        limit: i64,
    ) -> Result<Vec<BatchTask>, RepoError> {
        let rows: Vec<DbBatchTask> = sqlx::query_as(&format!(
            "{BATCH_SELECT} WHERE status = ? ORDER BY created_at ASC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbBatchTask::into_domain).collect()
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO payments (id, owner_kind, owner_id, external_payment_id, recipient_address,
                   amount, memo, status, txid, error_message, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payment.id.to_string())
        .bind(payment.owner.kind())
        .bind(payment.owner.uuid().to_string())
        .bind(&payment.external_payment_id)
        .bind(&payment.recipient_address)
        .bind(payment.amount.micros())
        .bind(&payment.memo)
        .bind(payment.status.as_str())
        .bind(&payment.txid)
        .bind(&payment.error_message)
        .bind(payment.created_at.to_rfc3339())
        .bind(payment.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), RepoError> {
        write_payment(&self.pool, payment).await
    }

    async fn update_leased_payment(
        &self,
        lease: &RunLease,
        payment: &Payment,
    ) -> Result<(), RepoError> {
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let renewed = sqlx::query(RENEW_LEASE)
            .bind(heartbeat(Utc::now()))
            .bind(lease.task_id.to_string())
            .bind(lease.run_id.to_string())
            .execute(&mut *db_tx)
            .await
            .map_err(db_err)?;
        if renewed.rows_affected() == 0 {
            return Err(lease_lost(lease));
        }

        write_payment(&mut *db_tx, payment).await?;
        db_tx.commit().await.map_err(tx_err)?;
        Ok(())
    }

    async fn list_payments(&self, owner: &PaymentOwner) -> Result<Vec<Payment>, RepoError> {
        let rows: Vec<DbPayment> = sqlx::query_as(&format!(
            "{PAYMENT_SELECT} WHERE owner_kind = ? AND owner_id = ? ORDER BY rowid ASC"
        ))
        .bind(owner.kind())
        .bind(owner.uuid().to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbPayment::into_domain).collect()
    }

    async fn find_payment_by_external_id(
        &self,
        external_payment_id: &str,
    ) -> Result<Option<Payment>, RepoError> {
        let row: Option<DbPayment> = sqlx::query_as(&format!(
            "{PAYMENT_SELECT} WHERE external_payment_id = ? ORDER BY rowid DESC LIMIT 1"
        ))
        .bind(external_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPayment::into_domain).transpose()
    }

    async fn count_payments_by_status(
        &self,
        owner: &PaymentOwner,
    ) -> Result<PaymentCounts, RepoError> {
        let rows: Vec<DbStatusCount> = sqlx::query_as(
            r#"SELECT status, COUNT(*) AS n FROM payments
               WHERE owner_kind = ? AND owner_id = ? GROUP BY status"#,
        )
        .bind(owner.kind())
        .bind(owner.uuid().to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut counts = PaymentCounts::default();
        for row in rows {
            let status: PaymentStatus = parse_status(&row.status)?;
            counts.add(status, row.n);
        }
        Ok(counts)
    }

    async fn find_or_create_settlement(
        &self,
        new: NewMerchantSettlement,
    ) -> Result<(MerchantSettlement, bool), RepoError> {
        let settlement = new.to_settlement();

        let inserted = sqlx::query(
            r#"INSERT INTO merchant_settlements (id, deposit_reference, merchant_id, merchant_address,
                   gross_amount, merchant_amount, dividend_amount, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (deposit_reference) DO NOTHING"#,
        )
        .bind(settlement.id.to_string())
        .bind(&settlement.deposit_reference)
        .bind(&settlement.merchant_id)
        .bind(&settlement.merchant_address)
        .bind(settlement.gross_amount.micros())
        .bind(settlement.merchant_amount.micros())
        .bind(settlement.dividend_amount.micros())
        .bind(settlement.status.as_str())
        .bind(settlement.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((settlement, false));
        }

        let row: Option<DbSettlement> =
            sqlx::query_as(&format!("{SETTLEMENT_SELECT} WHERE deposit_reference = ?"))
                .bind(&new.deposit_reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let existing = row.map(DbSettlement::into_domain).transpose()?.ok_or_else(|| {
            RepoError::Integrity(format!(
                "settlement {} conflicted but cannot be read back",
                new.deposit_reference
            ))
        })?;
        Ok((existing, true))
    }

    async fn get_settlement(
        &self,
        id: SettlementId,
    ) -> Result<Option<MerchantSettlement>, RepoError> {
        let row: Option<DbSettlement> = sqlx::query_as(&format!("{SETTLEMENT_SELECT} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbSettlement::into_domain).transpose()
    }

    async fn claim_settlement(&self, id: SettlementId) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"UPDATE merchant_settlements SET status = 'processing'
               WHERE id = ? AND status = 'pending'"#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_settlement(
        &self,
        id: SettlementId,
        payment: &Payment,
    ) -> Result<(MerchantSettlement, DividendPool), RepoError> {
        let now = now();
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let row: Option<DbSettlement> = sqlx::query_as(&format!("{SETTLEMENT_SELECT} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(db_err)?;
        let settlement = row.ok_or(RepoError::NotFound)?.into_domain()?;

        if settlement.status != SettlementStatus::Processing {
            return Err(RepoError::Conflict(format!(
                "settlement {} is {}, not processing",
                id, settlement.status
            )));
        }

        sqlx::query(
            r#"UPDATE merchant_settlements SET status = 'completed', payment_id = ?, completed_at = ?
               WHERE id = ? AND status = 'processing'"#,
        )
        .bind(payment.id.to_string())
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"INSERT INTO dividend_pools (merchant_id, balance, updated_at) VALUES (?, ?, ?)
               ON CONFLICT (merchant_id)
               DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at"#,
        )
        .bind(&settlement.merchant_id)
        .bind(settlement.dividend_amount.micros())
        .bind(&now)
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        let pool: DbDividendPool = sqlx::query_as(
            r#"SELECT merchant_id, balance, updated_at FROM dividend_pools WHERE merchant_id = ?"#,
        )
        .bind(&settlement.merchant_id)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(db_err)?;

        db_tx.commit().await.map_err(tx_err)?;

        let completed = self.fetch_settlement(id).await?;
        Ok((completed, pool.into_domain()?))
    }

    async fn fail_settlement(
        &self,
        id: SettlementId,
        error: &str,
    ) -> Result<MerchantSettlement, RepoError> {
        sqlx::query(
            r#"UPDATE merchant_settlements SET status = 'failed', error_message = ?, completed_at = ?
               WHERE id = ? AND status IN ('pending', 'processing')"#,
        )
        .bind(error)
        .bind(now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.fetch_settlement(id).await
    }

    async fn get_dividend_pool(
        &self,
        merchant_id: &str,
    ) -> Result<Option<DividendPool>, RepoError> {
        let row: Option<DbDividendPool> = sqlx::query_as(
            r#"SELECT merchant_id, balance, updated_at FROM dividend_pools WHERE merchant_id = ?"#,
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbDividendPool::into_domain).transpose()
    }

    async fn list_settlements_by_status(
        &self,
        status: SettlementStatus,
        limit: i64,
    ) -> Result<Vec<MerchantSettlement>, RepoError> {
        let rows: Vec<DbSettlement> = sqlx::query_as(&format!(
            "{SETTLEMENT_SELECT} WHERE status = ? ORDER BY created_at ASC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbSettlement::into_domain).collect()
    }

    async fn find_or_create_deposit(&self, new: NewDeposit) -> Result<(Deposit, bool), RepoError> {
        let deposit = new.to_deposit();

        let inserted = sqlx::query(
            r#"INSERT INTO deposits (id, gateway_payment_id, depositor_user_id, depositor_address,
                   amount, status, expires_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (gateway_payment_id) DO NOTHING"#,
        )
        .bind(deposit.id.to_string())
        .bind(&deposit.gateway_payment_id)
        .bind(&deposit.depositor_user_id)
        .bind(&deposit.depositor_address)
        .bind(deposit.amount.micros())
        .bind(deposit.status.as_str())
        .bind(deposit.expires_at.to_rfc3339())
        .bind(deposit.created_at.to_rfc3339())
        .bind(deposit.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((deposit, false));
        }

        let row: Option<DbDeposit> =
            sqlx::query_as(&format!("{DEPOSIT_SELECT} WHERE gateway_payment_id = ?"))
                .bind(&new.gateway_payment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let existing = row.map(DbDeposit::into_domain).transpose()?.ok_or_else(|| {
            RepoError::Integrity(format!(
                "deposit {} conflicted but cannot be read back",
                new.gateway_payment_id
            ))
        })?;
        Ok((existing, true))
    }

    async fn get_deposit(&self, id: DepositId) -> Result<Option<Deposit>, RepoError> {
        let row: Option<DbDeposit> = sqlx::query_as(&format!("{DEPOSIT_SELECT} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(DbDeposit::into_domain).transpose()
    }

    async fn list_deposits_by_status(
        &self,
        status: DepositStatus,
        limit: i64,
    ) -> Result<Vec<Deposit>, RepoError> {
        let rows: Vec<DbDeposit> = sqlx::query_as(&format!(
            "{DEPOSIT_SELECT} WHERE status = ? ORDER BY updated_at ASC LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(DbDeposit::into_domain).collect()
    }

    async fn lock_deposit_for_payout(
        &self,
        id: DepositId,
        expected: &[DepositStatus],
    ) -> Result<Option<DepositStatus>, RepoError> {
        let id_str = id.to_string();
        let mut db_tx = self.pool.begin().await.map_err(tx_err)?;

        let row: Option<DbStatus> = sqlx::query_as(r#"SELECT status FROM deposits WHERE id = ?"#)
            .bind(&id_str)
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(db_err)?;

        let current: DepositStatus = parse_status(&row.ok_or(RepoError::NotFound)?.status)?;
        if !expected.contains(&current) {
            return Ok(None);
        }

        let result = sqlx::query(
            r#"UPDATE deposits SET status = 'payout_pending', updated_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(now())
        .bind(&id_str)
        .bind(current.as_str())
        .execute(&mut *db_tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        db_tx.commit().await.map_err(tx_err)?;
        Ok(Some(current))
    }

    async fn finish_deposit_payout(
        &self,
        id: DepositId,
        status: DepositStatus,
        payment: &Payment,
    ) -> Result<Deposit, RepoError> {
        let result = sqlx::query(
            r#"UPDATE deposits SET status = ?, payout_payment_id = ?, payout_txid = ?, updated_at = ?
               WHERE id = ? AND status = 'payout_pending'"#,
        )
        .bind(status.as_str())
        .bind(&payment.external_payment_id)
        .bind(&payment.txid)
        .bind(now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict(format!(
                "deposit {} has no payout in flight",
                id
            )));
        }
        self.fetch_deposit(id).await
    }

    async fn release_deposit(
        &self,
        id: DepositId,
        restore: DepositStatus,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"UPDATE deposits SET status = ?, updated_at = ?
               WHERE id = ? AND status = 'payout_pending'"#,
        )
        .bind(restore.as_str())
        .bind(now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
