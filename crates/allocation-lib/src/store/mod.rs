//! Run persistence with SQLite.
//!
//! The RunStore owns the single database connection used by the pipeline:
//! - runs with their measurement time and cluster totals
//! - required resources belonging to a run
//! - time-range reconstruction of runs with their resources

use crate::error::{Error, Result};
use crate::models::{IdentityKey, ResourceUsage, Run};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, instrument};

pub mod migrations;


const INSERT_RUN: &str = r#"
    INSERT INTO runs (measured_time_utc, cluster_cpu_millicores, cluster_memory_mega_bytes)
    VALUES (?, ?, ?)
"#;

const INSERT_RESOURCE: &str = r#"
    INSERT INTO required_resources (run_id, wbs, application, environment, component,
                                    cpu_millicores, memory_mega_bytes, replicas)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const SELECT_RUNS_BETWEEN: &str = r#"
    SELECT r.id AS run_id, r.measured_time_utc, r.cluster_cpu_millicores,
           r.cluster_memory_mega_bytes, rr.id AS resource_id, rr.wbs, rr.application,
           rr.environment, rr.component, rr.cpu_millicores, rr.memory_mega_bytes, rr.replicas
    FROM runs r
    LEFT JOIN required_resources rr ON r.id = rr.run_id
    WHERE r.measured_time_utc BETWEEN ? AND ?
"#;

/// Store for runs and their required resources.
pub struct RunStore {
    pool: SqlitePool,
}

impl RunStore {
    /// Open a store backed by a private in-memory database (for tests).
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Open the database at `database_url`, creating it if missing, and migrate it.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Opening run store");

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::ConnectionUnavailable {
                reason: format!("invalid database url: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        // One long-lived connection; an in-memory database lives only as long as it does
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::ConnectionUnavailable {
                reason: e.to_string(),
            })?;

        migrations::run(&pool).await?;

        info!("Run store ready");
        Ok(Self { pool })
    }

    /// Release the connection. Later operations fail with `ConnectionUnavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Lightweight liveness probe run before every operation
    pub async fn verify_connection(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(Error::ConnectionUnavailable {
                reason: "connection has been closed".to_string(),
            });
        }

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::ConnectionUnavailable {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Insert a run row and return its new identifier.
    #[instrument(skip(self))]
    pub async fn insert_run(
        &self,
        measured_time_utc: DateTime<Utc>,
        cluster_cpu_millicores: i64,
        cluster_memory_mega_bytes: i64,
    ) -> Result<i64> {
        self.verify_connection().await?;

        let mut conn = self.pool.acquire().await.map_err(|e| Error::ConnectionUnavailable {
            reason: e.to_string(),
        })?;

        insert_run_row(
            &mut conn,
            measured_time_utc,
            cluster_cpu_millicores,
            cluster_memory_mega_bytes,
        )
        .await
    }

    /// Insert every resource of an already persisted run.
    ///
    /// The batch is one transaction: if any record fails, none of the
    /// records are committed. Record ids are assigned after the commit.
    #[instrument(skip(self, run), fields(run_id = ?run.id, resources = run.resources.len()))]
    pub async fn save_resources(&self, run: &mut Run) -> Result<()> {
        let run_id = run.id.ok_or(Error::RunNotPersisted)?;
        self.verify_connection().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Error::statement("begin resource batch", format!("run {}", run_id)))?;

        let ids = insert_resource_rows(&mut tx, run_id, &run.resources).await?;

        tx.commit()
            .await
            .map_err(Error::statement("commit resource batch", format!("run {}", run_id)))?;

        assign_ids(&mut run.resources, ids);
        Ok(())
    }

    /// Persist a run together with its resources and return the run id.
    ///
    /// Run row and resource rows are written in a single transaction.
    #[instrument(skip(self, run), fields(measured_time = %run.measured_time_utc, resources = run.resources.len()))]
    pub async fn save_run(&self, run: &mut Run) -> Result<i64> {
        self.verify_connection().await?;

        let context = format!("run measured at {}", run.measured_time_utc);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Error::statement("begin run", context.clone()))?;

        let run_id = insert_run_row(
            &mut tx,
            run.measured_time_utc,
            run.cluster_cpu_millicores,
            run.cluster_memory_mega_bytes,
        )
        .await?;
        let ids = insert_resource_rows(&mut tx, run_id, &run.resources).await?;

        tx.commit()
            .await
            .map_err(Error::statement("commit run", context))?;

        run.id = Some(run_id);
        assign_ids(&mut run.resources, ids);

        debug!(run_id = run_id, "Run persisted");
        Ok(run_id)
    }

    /// All runs measured within `[from, to]` (inclusive), each with its resources.
    ///
    /// Runs come back ordered by measurement time, resources by id.
    #[instrument(skip(self))]
    pub async fn runs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Run>> {
        self.verify_connection().await?;

        let rows = sqlx::query(SELECT_RUNS_BETWEEN)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::statement(
                "select runs",
                format!("between {} and {}", from, to),
            ))?;

        // Rows of one run are not assumed to be adjacent
        let mut runs: HashMap<i64, Run> = HashMap::new();
        for row in &rows {
            let run_id: i64 = row
                .try_get("run_id")
                .map_err(Error::statement("decode run row", "run_id"))?;

            let run = match runs.entry(run_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(row_to_run(run_id, row)?),
            };

            if let Some(resource) = row_to_resource(run_id, row)? {
                run.resources.push(resource);
            }
        }

        let mut runs: Vec<Run> = runs.into_values().collect();
        for run in &mut runs {
            run.resources.sort_by_key(|r| r.id);
        }
        runs.sort_by(|a, b| {
            a.measured_time_utc
                .cmp(&b.measured_time_utc)
                .then(a.id.cmp(&b.id))
        });

        debug!(runs = runs.len(), rows = rows.len(), "Reconstructed runs");
        Ok(runs)
    }
}

async fn insert_run_row(
    conn: &mut SqliteConnection,
    measured_time_utc: DateTime<Utc>,
    cluster_cpu_millicores: i64,
    cluster_memory_mega_bytes: i64,
) -> Result<i64> {
    let result = sqlx::query(INSERT_RUN)
        .bind(measured_time_utc.timestamp_millis())
        .bind(cluster_cpu_millicores)
        .bind(cluster_memory_mega_bytes)
        .execute(conn)
        .await
        .map_err(Error::statement(
            "insert run",
            format!("measured at {}", measured_time_utc),
        ))?;

    Ok(result.last_insert_rowid())
}

/// Insert resources one at a time, stopping at the first failure
async fn insert_resource_rows(
    conn: &mut SqliteConnection,
    run_id: i64,
    resources: &[ResourceUsage],
) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(resources.len());

    for (index, resource) in resources.iter().enumerate() {
        let result = sqlx::query(INSERT_RESOURCE)
            .bind(run_id)
            .bind(resource.wbs.as_deref().unwrap_or_default())
            .bind(&resource.key.application)
            .bind(&resource.key.environment)
            .bind(&resource.key.component)
            .bind(resource.cpu_millicores)
            .bind(resource.memory_mega_bytes)
            .bind(resource.replicas)
            .execute(&mut *conn)
            .await
            .map_err(Error::statement(
                "insert required resources",
                format!("run {}, record {} ({})", run_id, index, resource.key),
            ))?;

        ids.push(result.last_insert_rowid());
    }

    Ok(ids)
}

fn assign_ids(resources: &mut [ResourceUsage], ids: Vec<i64>) {
    for (resource, id) in resources.iter_mut().zip(ids) {
        resource.id = Some(id);
    }
}

fn row_to_run(run_id: i64, row: &SqliteRow) -> Result<Run> {
    let context = format!("run {}", run_id);

    let millis: i64 = row
        .try_get("measured_time_utc")
        .map_err(Error::statement("decode run row", context.clone()))?;
    let measured_time_utc = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        Error::StatementFailed {
            statement: "decode run row",
            context: context.clone(),
            source: sqlx::Error::Decode(
                format!("measured_time_utc {} is out of range", millis).into(),
            ),
        }
    })?;

    Ok(Run {
        id: Some(run_id),
        measured_time_utc,
        cluster_cpu_millicores: row
            .try_get("cluster_cpu_millicores")
            .map_err(Error::statement("decode run row", context.clone()))?,
        cluster_memory_mega_bytes: row
            .try_get("cluster_memory_mega_bytes")
            .map_err(Error::statement("decode run row", context))?,
        resources: Vec::new(),
    })
}

/// Resource columns of a joined row; all NULL for a run without resources
fn row_to_resource(run_id: i64, row: &SqliteRow) -> Result<Option<ResourceUsage>> {
    let context = format!("resource of run {}", run_id);
    let decode = || Error::statement("decode resource row", context.clone());

    let id: Option<i64> = row.try_get("resource_id").map_err(decode())?;
    let Some(id) = id else {
        return Ok(None);
    };

    Ok(Some(ResourceUsage {
        id: Some(id),
        wbs: Some(row.try_get("wbs").map_err(decode())?),
        key: IdentityKey {
            application: row.try_get("application").map_err(decode())?,
            environment: row.try_get("environment").map_err(decode())?,
            component: row.try_get("component").map_err(decode())?,
        },
        cpu_millicores: row.try_get("cpu_millicores").map_err(decode())?,
        memory_mega_bytes: row.try_get("memory_mega_bytes").map_err(decode())?,
        replicas: row.try_get("replicas").map_err(decode())?,
    }))
}
