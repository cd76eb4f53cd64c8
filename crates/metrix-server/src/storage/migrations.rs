//! Database migrations.

use sqlx::SqlitePool;
use tracing::{info, instrument};

use metrix_common::protocol::error::{MetrixError, Result};

const SCHEMA_VERSION: i64 = 1;

fn migration_err(e: sqlx::Error) -> MetrixError {
    MetrixError::Storage(format!("migration failed: {e}"))
}

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_err)?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(migration_err)?;
    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    let mut tx = pool.begin().await.map_err(migration_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gauges (
            name TEXT PRIMARY KEY,
            value REAL NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(migration_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            delta INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(migration_err)?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (1)")
        .execute(&mut *tx)
        .await
        .map_err(migration_err)?;

    tx.commit().await.map_err(migration_err)?;
    Ok(())
}
