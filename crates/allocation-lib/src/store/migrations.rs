//! Database migrations.

use crate::error::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 2;

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
    .map_err(migration_failed)?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(migration_failed)?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!(
        "Migrating database from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(migration_failed)?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(migration_failed)?;

    Ok(())
}

/// Runs and their required resources
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Applying migration v1: runs and required_resources");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            measured_time_utc INTEGER NOT NULL,
            cluster_cpu_millicores INTEGER NOT NULL,
            cluster_memory_mega_bytes INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS required_resources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id INTEGER NOT NULL REFERENCES runs(id),
            wbs TEXT NOT NULL DEFAULT '',
            application TEXT NOT NULL,
            environment TEXT NOT NULL,
            component TEXT NOT NULL,
            cpu_millicores INTEGER NOT NULL CHECK (cpu_millicores >= 0),
            memory_mega_bytes INTEGER NOT NULL CHECK (memory_mega_bytes >= 0),
            replicas INTEGER NOT NULL CHECK (replicas >= 0)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    Ok(())
}

/// Indexes for time-range retrieval and the run join
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Applying migration v2: lookup indexes");

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runs_measured_time ON runs(measured_time_utc)",
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_required_resources_run ON required_resources(run_id)",
    )
    .execute(pool)
    .await
    .map_err(migration_failed)?;

    Ok(())
}

fn migration_failed(e: sqlx::Error) -> Error {
    Error::Migration {
        reason: e.to_string(),
    }
}
