/*!
 * Relational Storage Backend
 * SQLite tables for gauges and counters behind an sqlx pool
 */

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use super::traits::Storage;
use crate::core::errors::{StorageError, StorageResult};
use crate::core::limits::RELATIONAL_MAX_CONNECTIONS;
use crate::metric::{Metric, MetricKind, MetricValue};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS gauges (
        name TEXT PRIMARY KEY NOT NULL,
        value REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS counters (
        name TEXT PRIMARY KEY NOT NULL,
        value INTEGER NOT NULL
    )
    "#,
];

const UPSERT_GAUGE: &str = r#"
    INSERT INTO gauges (name, value) VALUES (?, ?)
    ON CONFLICT(name) DO UPDATE SET value = excluded.value
"#;

// The update is skipped (zero rows affected) when the sum would leave the
// 64-bit range.
const UPSERT_COUNTER: &str = r#"
    INSERT INTO counters (name, value) VALUES (?, ?)
    ON CONFLICT(name) DO UPDATE SET value = counters.value + excluded.value
    WHERE (excluded.value >= 0 AND counters.value <= 9223372036854775807 - excluded.value)
       OR (excluded.value < 0 AND counters.value >= (-9223372036854775807 - 1) - excluded.value)
"#;

/// Store backed by a relational database
///
/// Every store is a single upsert statement, so concurrent increments on the
/// same counter never lose updates. A batch runs in one transaction.
#[derive(Clone)]
pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    /// Connect to the database file at `path`, creating it if missing
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io("create_dir", e))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(RELATIONAL_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::backend("connect", e))?;

        info!("relational store connected");
        Ok(Self { pool })
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::backend("connect", e))?;

        // Each connection would get its own database; pin a single one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::backend("connect", e))?;

        Ok(Self { pool })
    }

    /// Create the gauge and counter tables if they do not exist
    pub async fn apply_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::backend("apply_schema", e))?;
        }
        debug!("relational schema applied");
        Ok(())
    }

    /// Round-trip a trivial query to check connectivity
    pub async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::backend("ping", e))
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert<'c, E>(executor: E, metric: &Metric) -> StorageResult<()>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        match metric.value {
            MetricValue::Gauge(v) => {
                sqlx::query(UPSERT_GAUGE)
                    .bind(&metric.name)
                    .bind(v)
                    .execute(executor)
                    .await
                    .map_err(|e| StorageError::backend("store", e))?;
            }
            MetricValue::Counter(delta) => {
                let result = sqlx::query(UPSERT_COUNTER)
                    .bind(&metric.name)
                    .bind(delta)
                    .execute(executor)
                    .await
                    .map_err(|e| StorageError::backend("store", e))?;
                if result.rows_affected() == 0 {
                    return Err(StorageError::Overflow {
                        name: metric.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn store_in_tx(tx: &mut Transaction<'_, Sqlite>, metrics: &[Metric]) -> StorageResult<()> {
        for metric in metrics {
            Self::upsert(&mut **tx, metric).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for RelationalStore {
    async fn store(&self, metric: &Metric) -> StorageResult<()> {
        metric.validate()?;
        Self::upsert(&self.pool, metric).await
    }

    async fn store_batch(&self, metrics: &[Metric]) -> StorageResult<()> {
        for metric in metrics {
            metric.validate()?;
        }
        if metrics.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::backend("begin", e))?;

        // Dropping an uncommitted transaction rolls it back
        Self::store_in_tx(&mut tx, metrics).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::backend("commit", e))
    }

    async fn gauge(&self, name: &str) -> StorageResult<f64> {
        sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::backend("gauge", e))?
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn counter(&self, name: &str) -> StorageResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::backend("counter", e))?
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn list(&self) -> StorageResult<Vec<Metric>> {
        let gauges = sqlx::query("SELECT name, value FROM gauges")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::backend("list", e))?;
        let counters = sqlx::query("SELECT name, value FROM counters")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::backend("list", e))?;

        let mut metrics = Vec::with_capacity(gauges.len() + counters.len());
        for row in counters {
            let name: String = row.try_get("name").map_err(|e| StorageError::backend("list", e))?;
            let value: i64 = row.try_get("value").map_err(|e| StorageError::backend("list", e))?;
            metrics.push(Metric::counter(name, value));
        }
        for row in gauges {
            let name: String = row.try_get("name").map_err(|e| StorageError::backend("list", e))?;
            let value: f64 = row.try_get("value").map_err(|e| StorageError::backend("list", e))?;
            metrics.push(Metric::gauge(name, value));
        }
        Ok(metrics)
    }
}
