//! PostgreSQL ledger backed by sqlx.
//!
//! Schema lives in `migrations/`. Balances are computed with a
//! `GROUP BY payer_id` over `ledger_entries`, left-joined to `payers` so a
//! payer missing from the directory still shows up with its raw id.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use rentwatch_core::config::PostgresConfig;
use rentwatch_core::{AggregatedBalance, LedgerEntry, PayerProfile};

use crate::error::StoreError;
use crate::ledger::LedgerStore;

const AGGREGATE_SELECT: &str = "
    SELECT e.payer_id,
           COALESCE(p.display_name, e.payer_id) AS display_name,
           SUM(e.amount)::BIGINT                AS balance,
           p.notify_channel,
           MAX(e.occurred_at)                   AS most_recent_entry_at
    FROM ledger_entries e
    LEFT JOIN payers p ON p.payer_id = e.payer_id";

const AGGREGATE_GROUP: &str = "
    GROUP BY e.payer_id, p.display_name, p.notify_channel";

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    payer_id: String,
    display_name: String,
    balance: i64,
    notify_channel: Option<String>,
    most_recent_entry_at: i64,
}

impl From<BalanceRow> for AggregatedBalance {
    fn from(row: BalanceRow) -> Self {
        Self {
            payer_id: row.payer_id,
            display_name: row.display_name,
            balance: row.balance,
            notify_channel: row.notify_channel,
            most_recent_entry_at: row.most_recent_entry_at,
        }
    }
}

fn aggregate_for_sql() -> String {
    format!("{AGGREGATE_SELECT} WHERE e.payer_id = $1 {AGGREGATE_GROUP}")
}

fn aggregate_all_sql() -> String {
    format!("{AGGREGATE_SELECT} {AGGREGATE_GROUP} ORDER BY most_recent_entry_at ASC, e.payer_id ASC")
}

const INSERT_ENTRY: &str =
    "INSERT INTO ledger_entries (payer_id, amount, occurred_at, note) VALUES ($1, $2, $3, $4)";

/// `SET` takes no bind parameters. Zero would disable the timeout, so the
/// value is floored at one millisecond.
fn statement_timeout_sql(timeout: Duration) -> String {
    format!("SET LOCAL statement_timeout = {}", timeout.as_millis().max(1))
}

pub struct PgLedgerStore {
    pool: PgPool,
    statement_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Bound every statement of a charge transaction on the server side, so a
    /// slow write aborts and rolls back inside the database instead of
    /// committing after the caller gave up.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Open a pool from config. The pool's acquire timeout is the storage
    /// deadline, so a saturated pool fails instead of queueing forever.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.storage_timeout())
            .connect(&config.connection_string())
            .await?;
        info!(url = %config.redacted_url(), "PostgreSQL connected");
        Ok(Self::new(pool).with_statement_timeout(config.storage_timeout()))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Ledger migrations applied");
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(INSERT_ENTRY)
            .bind(&entry.payer_id)
            .bind(entry.amount)
            .bind(entry.occurred_at)
            .bind(&entry.note)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn aggregate_for(&self, payer_id: &str) -> Result<AggregatedBalance, StoreError> {
        sqlx::query_as::<_, BalanceRow>(&aggregate_for_sql())
            .bind(payer_id)
            .fetch_optional(&self.pool)
            .await?
            .map(AggregatedBalance::from)
            .ok_or_else(|| StoreError::NotFound(payer_id.to_string()))
    }

    async fn aggregate_all(&self) -> Result<Vec<AggregatedBalance>, StoreError> {
        let rows = sqlx::query_as::<_, BalanceRow>(&aggregate_all_sql())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AggregatedBalance::from).collect())
    }

    async fn upsert_payer(&self, profile: &PayerProfile) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payers (payer_id, display_name, notify_channel)
             VALUES ($1, $2, $3)
             ON CONFLICT (payer_id) DO UPDATE
               SET display_name = EXCLUDED.display_name,
                   notify_channel = EXCLUDED.notify_channel,
                   updated_at = now()",
        )
        .bind(&profile.payer_id)
        .bind(&profile.display_name)
        .bind(&profile.notify_channel)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_charge(&self, entry: &LedgerEntry) -> Result<AggregatedBalance, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(timeout) = self.statement_timeout {
            sqlx::query(&statement_timeout_sql(timeout))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(INSERT_ENTRY)
            .bind(&entry.payer_id)
            .bind(entry.amount)
            .bind(entry.occurred_at)
            .bind(&entry.note)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, BalanceRow>(&aggregate_for_sql())
            .bind(&entry.payer_id)
            .fetch_optional(&mut *tx)
            .await?;

        // The row was inserted in this transaction, so the aggregate cannot
        // be empty; treat it as a failed write rather than committing.
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(entry.payer_id.clone()));
        };

        tx.commit().await?;
        Ok(row.into())
    }

    async fn entries_for(&self, payer_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, i64, String)>(
            "SELECT payer_id, amount, occurred_at, note
             FROM ledger_entries
             WHERE payer_id = $1
             ORDER BY id ASC",
        )
        .bind(payer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(payer_id, amount, occurred_at, note)| LedgerEntry {
                payer_id,
                amount,
                occurred_at,
                note,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
