//! Durable store on SQLite.
//!
//! Every mutation runs in a single transaction taken under a store-wide write
//! lock. The lock keeps SQLite from failing a read-then-write transaction with
//! `SQLITE_BUSY` when two runs finish steps at the same moment.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use scrivener_types::{
    RunStatus, Transformation, TransformationRun, TransformationStep, TransformationStepRun,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{RunStore, TransformationStore};

/// Schema history, embedded from `crates/backend/migrations`.
static MIGRATOR: Migrator = sqlx::migrate!();

pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and ensure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
            })?;

        tracing::debug!(path = %path.display(), "Opened SQLite run store");
        Self::with_pool(pool).await
    }

    /// A private in-memory database that lives as long as the store.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // One connection that never expires; a new connection would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("cannot migrate run store: {}", e)))?;
        Ok(SqliteStore {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Load the stored run, apply `transition`, and persist what changed in one transaction.
    async fn transition<T, F>(&self, run_id: Uuid, transition: F) -> StoreResult<T>
    where
        F: FnOnce(&TransformationRun) -> StoreResult<(TransformationRun, T)> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let stored = load_run(&mut tx, run_id).await?;
        let (next, extra) = transition(&stored)?;
        persist_changes(&mut tx, &stored, &next).await?;
        tx.commit().await?;
        Ok(extra)
    }

    async fn list_runs_where(&self, column: &str, value: &str) -> StoreResult<Vec<TransformationRun>> {
        let sql = format!("SELECT id FROM transformation_runs WHERE {} = ?1", column);
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_all(&mut *conn)
            .await?;

        let mut runs = Vec::with_capacity(ids.len());
        for id in ids {
            runs.push(load_run(&mut conn, parse_uuid(&id)?).await?);
        }
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StoreError::Serialization(format!("invalid id '{}': {}", value, e)))
}

fn status_columns(status: &RunStatus) -> (&'static str, Option<&str>, Option<&str>) {
    (status.as_str(), status.output(), status.error())
}

fn status_from_row(row: &SqliteRow) -> StoreResult<RunStatus> {
    let status: String = row.try_get("status")?;
    let output: Option<String> = row.try_get("output")?;
    let error: Option<String> = row.try_get("error")?;
    match (status.as_str(), output, error) {
        ("running", _, _) => Ok(RunStatus::Running),
        ("completed", Some(output), _) => Ok(RunStatus::Completed { output }),
        ("failed", _, Some(error)) => Ok(RunStatus::Failed { error }),
        (other, _, _) => Err(StoreError::Serialization(format!(
            "inconsistent stored status '{}'",
            other
        ))),
    }
}

fn transformation_from_row(row: &SqliteRow) -> StoreResult<Transformation> {
    let steps: String = row.try_get("steps")?;
    let steps: Vec<TransformationStep> = serde_json::from_str(&steps)?;
    Ok(Transformation {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        steps,
    })
}

async fn load_transformation(
    conn: &mut SqliteConnection,
    id: &str,
) -> StoreResult<Option<Transformation>> {
    let row = sqlx::query(
        "SELECT id, title, description, steps, created_at, updated_at \
         FROM transformations WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(transformation_from_row).transpose()
}

async fn load_run(conn: &mut SqliteConnection, run_id: Uuid) -> StoreResult<TransformationRun> {
    let row = sqlx::query(
        "SELECT id, transformation_id, recording_id, input, status, output, error, \
         started_at, completed_at FROM transformation_runs WHERE id = ?1",
    )
    .bind(run_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::run_not_found(run_id))?;

    let step_rows = sqlx::query(
        "SELECT id, step_id, input, status, output, error, started_at, completed_at \
         FROM transformation_step_runs WHERE run_id = ?1 ORDER BY position",
    )
    .bind(run_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut step_runs = Vec::with_capacity(step_rows.len());
    for step_row in &step_rows {
        let id: String = step_row.try_get("id")?;
        step_runs.push(TransformationStepRun {
            id: parse_uuid(&id)?,
            step_id: step_row.try_get("step_id")?,
            input: step_row.try_get("input")?,
            started_at: step_row.try_get("started_at")?,
            completed_at: step_row.try_get("completed_at")?,
            status: status_from_row(step_row)?,
        });
    }

    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;
    Ok(TransformationRun {
        id: run_id,
        transformation_id: row.try_get("transformation_id")?,
        recording_id: row.try_get("recording_id")?,
        input: row.try_get("input")?,
        started_at: row.try_get("started_at")?,
        completed_at,
        status: status_from_row(&row)?,
        step_runs,
    })
}

async fn insert_step_run(
    conn: &mut SqliteConnection,
    run_id: Uuid,
    position: usize,
    step_run: &TransformationStepRun,
) -> StoreResult<()> {
    let (status, output, error) = status_columns(&step_run.status);
    sqlx::query(
        "INSERT INTO transformation_step_runs \
         (id, run_id, position, step_id, input, status, output, error, started_at, completed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .bind(step_run.id.to_string())
    .bind(run_id.to_string())
    .bind(position as i64)
    .bind(&step_run.step_id)
    .bind(&step_run.input)
    .bind(status)
    .bind(output)
    .bind(error)
    .bind(step_run.started_at)
    .bind(step_run.completed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Write the difference between two snapshots of the same run.
async fn persist_changes(
    conn: &mut SqliteConnection,
    before: &TransformationRun,
    after: &TransformationRun,
) -> StoreResult<()> {
    for (position, step_run) in after.step_runs.iter().enumerate() {
        match before.step_runs.get(position) {
            None => insert_step_run(conn, after.id, position, step_run).await?,
            Some(previous) if previous != step_run => {
                let (status, output, error) = status_columns(&step_run.status);
                sqlx::query(
                    "UPDATE transformation_step_runs \
                     SET status = ?1, output = ?2, error = ?3, completed_at = ?4 WHERE id = ?5",
                )
                .bind(status)
                .bind(output)
                .bind(error)
                .bind(step_run.completed_at)
                .bind(step_run.id.to_string())
                .execute(&mut *conn)
                .await?;
            }
            Some(_) => {}
        }
    }

    if before.status != after.status {
        let (status, output, error) = status_columns(&after.status);
        sqlx::query(
            "UPDATE transformation_runs \
             SET status = ?1, output = ?2, error = ?3, completed_at = ?4 WHERE id = ?5",
        )
        .bind(status)
        .bind(output)
        .bind(error)
        .bind(after.completed_at)
        .bind(after.id.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl TransformationStore for SqliteStore {
    async fn list_transformations(&self) -> StoreResult<Vec<Transformation>> {
        let rows = sqlx::query(
            "SELECT id, title, description, steps, created_at, updated_at \
             FROM transformations ORDER BY title, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transformation_from_row).collect()
    }

    async fn get_transformation(&self, id: &str) -> StoreResult<Transformation> {
        let mut conn = self.pool.acquire().await?;
        load_transformation(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::transformation_not_found(id))
    }

    async fn create_transformation(
        &self,
        transformation: &Transformation,
    ) -> StoreResult<Transformation> {
        transformation.validate()?;
        let steps = serde_json::to_string(&transformation.steps)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        if load_transformation(&mut tx, &transformation.id).await?.is_some() {
            return Err(StoreError::Conflict(format!(
                "transformation '{}' already exists",
                transformation.id
            )));
        }
        sqlx::query(
            "INSERT INTO transformations (id, title, description, steps, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&transformation.id)
        .bind(&transformation.title)
        .bind(&transformation.description)
        .bind(steps)
        .bind(transformation.created_at)
        .bind(transformation.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(transformation.clone())
    }

    async fn update_transformation(
        &self,
        transformation: &Transformation,
    ) -> StoreResult<Transformation> {
        transformation.validate()?;
        let steps = serde_json::to_string(&transformation.steps)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let stored = load_transformation(&mut tx, &transformation.id)
            .await?
            .ok_or_else(|| StoreError::transformation_not_found(&transformation.id))?;

        let mut updated = transformation.clone();
        updated.created_at = stored.created_at;
        updated.updated_at = Utc::now();
        sqlx::query(
            "UPDATE transformations SET title = ?1, description = ?2, steps = ?3, updated_at = ?4 \
             WHERE id = ?5",
        )
        .bind(&updated.title)
        .bind(&updated.description)
        .bind(steps)
        .bind(updated.updated_at)
        .bind(&updated.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_transformation(&self, id: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM transformations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::transformation_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn create_run(
        &self,
        transformation_id: &str,
        recording_id: Option<&str>,
        input: &str,
    ) -> StoreResult<TransformationRun> {
        let run = TransformationRun::start(
            transformation_id,
            recording_id.map(str::to_string),
            input,
            Utc::now(),
        );
        let (status, output, error) = status_columns(&run.status);

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO transformation_runs \
             (id, transformation_id, recording_id, input, status, output, error, started_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(run.id.to_string())
        .bind(&run.transformation_id)
        .bind(run.recording_id.as_deref())
        .bind(&run.input)
        .bind(status)
        .bind(output)
        .bind(error)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    async fn append_step_run(
        &self,
        run: &TransformationRun,
        step_id: &str,
        input: &str,
    ) -> StoreResult<(TransformationRun, TransformationStepRun)> {
        self.transition(run.id, |stored| {
            let (next, step_run) = stored.append_step_run(step_id, input, Utc::now())?;
            Ok((next.clone(), (next, step_run)))
        })
        .await
    }

    async fn complete_step_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        output: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.complete_step_run(step_run_id, output, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn fail_run(
        &self,
        run: &TransformationRun,
        step_run_id: Uuid,
        error: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.fail(step_run_id, error, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn complete_run(
        &self,
        run: &TransformationRun,
        output: &str,
    ) -> StoreResult<TransformationRun> {
        self.transition(run.id, |stored| {
            let next = stored.complete(output, Utc::now())?;
            Ok((next.clone(), next))
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<TransformationRun> {
        let mut conn = self.pool.acquire().await?;
        load_run(&mut conn, id).await
    }

    async fn list_runs_by_transformation(
        &self,
        transformation_id: &str,
    ) -> StoreResult<Vec<TransformationRun>> {
        self.list_runs_where("transformation_id", transformation_id)
            .await
    }

    async fn list_runs_by_recording(
        &self,
        recording_id: &str,
    ) -> StoreResult<Vec<TransformationRun>> {
        self.list_runs_where("recording_id", recording_id).await
    }
}
