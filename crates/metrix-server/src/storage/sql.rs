//! Relational backend on SQLite.
//!
//! Counters and gauges live in two tables keyed by name. Upserts are single
//! statements, so concurrent writers never lose an increment:
//!
//! ```sql
//! INSERT INTO counters (name, delta) VALUES (?, ?)
//!     ON CONFLICT(name) DO UPDATE SET delta = counters.delta + excluded.delta
//! ```
//!
//! A batch runs inside one transaction. The two upsert statements are
//! prepared once per connection and reused for every record. Any validation
//! or execution error returns early, and dropping the uncommitted
//! transaction rolls it back.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::{MetricKind, MetricRecord, MetricValue};

use super::{counter_overflow, migrations, MetricStore};

// SQLite turns an overflowing integer sum into a REAL; the WHERE clause
// skips the update instead, leaving zero affected rows.
const UPSERT_COUNTER: &str = "INSERT INTO counters (name, delta) VALUES (?, ?) \
     ON CONFLICT(name) DO UPDATE SET delta = counters.delta + excluded.delta \
     WHERE typeof(counters.delta + excluded.delta) = 'integer'";

const UPSERT_COUNTER_RETURNING: &str = "INSERT INTO counters (name, delta) VALUES (?, ?) \
     ON CONFLICT(name) DO UPDATE SET delta = counters.delta + excluded.delta \
     WHERE typeof(counters.delta + excluded.delta) = 'integer' RETURNING delta";

const UPSERT_GAUGE: &str = "INSERT INTO gauges (name, value) VALUES (?, ?) \
     ON CONFLICT(name) DO UPDATE SET value = excluded.value";

fn db_err(e: sqlx::Error) -> MetrixError {
    MetrixError::Storage(e.to_string())
}

#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connects to the database named by `dsn` and runs migrations.
    ///
    /// `sqlite::memory:` databases use a single long-lived connection, since
    /// every SQLite connection to `:memory:` is a separate database.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| MetrixError::Config(format!("invalid database DSN: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if dsn.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(db_err)?;
        migrations::run(&pool).await?;

        info!("Relational storage ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetricStore for SqlStore {
    async fn upsert_counter(&self, name: &str, delta: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(UPSERT_COUNTER_RETURNING)
            .bind(name)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| counter_overflow(name))
    }

    async fn replace_gauge(&self, name: &str, value: f64) -> Result<()> {
        sqlx::query(UPSERT_GAUGE)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn counter(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT delta FROM counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| MetrixError::not_found(MetricKind::Counter, name))
    }

    async fn gauge(&self, name: &str) -> Result<f64> {
        sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| MetrixError::not_found(MetricKind::Gauge, name))
    }

    async fn counters(&self) -> Result<BTreeMap<String, i64>> {
        let rows = sqlx::query("SELECT name, delta FROM counters ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("name").map_err(db_err)?,
                    row.try_get::<i64, _>("delta").map_err(db_err)?,
                ))
            })
            .collect()
    }

    async fn gauges(&self) -> Result<BTreeMap<String, f64>> {
        let rows = sqlx::query("SELECT name, value FROM gauges ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("name").map_err(db_err)?,
                    row.try_get::<f64, _>("value").map_err(db_err)?,
                ))
            })
            .collect()
    }

    #[instrument(skip(self, records), fields(batch = records.len()))]
    async fn apply_batch(&self, records: &[MetricRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            let metric = record.validate()?;
            match metric.value {
                MetricValue::Counter(delta) => {
                    let done = sqlx::query(UPSERT_COUNTER)
                        .bind(&metric.id)
                        .bind(delta)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                    if done.rows_affected() == 0 {
                        return Err(counter_overflow(&metric.id));
                    }
                }
                MetricValue::Gauge(value) => {
                    sqlx::query(UPSERT_GAUGE)
                        .bind(&metric.id)
                        .bind(value)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                }
            }
        }
        tx.commit().await.map_err(db_err)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        conn.ping().await.map_err(db_err)
    }
}
