//! SQLite implementation of the WorkerRepository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Worker, WorkerRole, WorkerStatus};
use crate::domain::ports::worker_repository::{WorkerFilter, WorkerRepository};

use super::utils::{fmt_datetime, parse_opt_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct WorkerRow {
    id: String,
    handle: String,
    role: String,
    status: String,
    working_dir: String,
    initial_prompt: Option<String>,
    worktree_path: Option<String>,
    branch: Option<String>,
    pid: Option<i64>,
    last_heartbeat: Option<String>,
    restart_count: i64,
    swarm_id: Option<String>,
    depth: i64,
    spawned_at: String,
    dismissed_at: Option<String>,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = OrchestratorError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        let role = WorkerRole::parse_str(&row.role)
            .ok_or_else(|| OrchestratorError::StorageIo(format!("bad role '{}'", row.role)))?;
        let status = WorkerStatus::parse_str(&row.status)
            .ok_or_else(|| OrchestratorError::StorageIo(format!("bad status '{}'", row.status)))?;
        Ok(Worker {
            id: parse_uuid(&row.id)?,
            handle: row.handle,
            role,
            status,
            working_dir: row.working_dir,
            initial_prompt: row.initial_prompt,
            worktree_path: row.worktree_path,
            branch: row.branch,
            pid: row.pid.map(|p| p as u32),
            last_heartbeat: parse_opt_datetime(row.last_heartbeat.as_deref())?,
            restart_count: row.restart_count as u32,
            swarm_id: row.swarm_id,
            depth: row.depth as u32,
            spawned_at: super::utils::parse_datetime(&row.spawned_at)?,
            dismissed_at: parse_opt_datetime(row.dismissed_at.as_deref())?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

/// Append to the worker audit trail within the surrounding transaction.
async fn record_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    worker_id: Uuid,
    event: &str,
    detail: &str,
) -> OrchestratorResult<()> {
    sqlx::query(
        "INSERT INTO worker_events (worker_id, event, detail, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(worker_id.to_string())
    .bind(event)
    .bind(detail)
    .bind(fmt_datetime(Utc::now()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn insert(&self, worker: &Worker) -> OrchestratorResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO workers (id, handle, role, status, working_dir, initial_prompt,
               worktree_path, branch, pid, last_heartbeat, restart_count, swarm_id, depth,
               spawned_at, dismissed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(worker.id.to_string())
        .bind(&worker.handle)
        .bind(worker.role.as_str())
        .bind(worker.status.as_str())
        .bind(&worker.working_dir)
        .bind(&worker.initial_prompt)
        .bind(&worker.worktree_path)
        .bind(&worker.branch)
        .bind(worker.pid.map(i64::from))
        .bind(worker.last_heartbeat.map(fmt_datetime))
        .bind(worker.restart_count as i64)
        .bind(&worker.swarm_id)
        .bind(worker.depth as i64)
        .bind(fmt_datetime(worker.spawned_at))
        .bind(worker.dismissed_at.map(fmt_datetime))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(OrchestratorError::HandleTaken(worker.handle.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Worker>> {
        let row: Option<WorkerRow> = sqlx::query_as("SELECT * FROM workers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Worker::try_from).transpose()
    }

    async fn get_by_handle(&self, handle: &str) -> OrchestratorResult<Option<Worker>> {
        let row: Option<WorkerRow> = sqlx::query_as(
            "SELECT * FROM workers WHERE handle = ? ORDER BY spawned_at DESC, rowid DESC LIMIT 1",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Worker::try_from).transpose()
    }

    async fn get_live_by_handle(&self, handle: &str) -> OrchestratorResult<Option<Worker>> {
        let row: Option<WorkerRow> = sqlx::query_as(
            "SELECT * FROM workers WHERE handle = ? AND dismissed_at IS NULL LIMIT 1",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Worker::try_from).transpose()
    }

    async fn list(&self, filter: WorkerFilter) -> OrchestratorResult<Vec<Worker>> {
        let mut sql = String::from("SELECT * FROM workers WHERE 1=1");
        if !filter.include_dismissed {
            sql.push_str(" AND dismissed_at IS NULL");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.role.is_some() {
            sql.push_str(" AND role = ?");
        }
        if filter.swarm_id.is_some() {
            sql.push_str(" AND swarm_id = ?");
        }
        sql.push_str(" ORDER BY spawned_at ASC, rowid ASC");

        let mut query = sqlx::query_as::<_, WorkerRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(role) = filter.role {
            query = query.bind(role.as_str());
        }
        if let Some(swarm_id) = filter.swarm_id {
            query = query.bind(swarm_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn count_live(&self) -> OrchestratorResult<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM workers WHERE dismissed_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn update_status(&self, id: Uuid, status: WorkerStatus) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE workers SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "worker",
                id: id.to_string(),
            });
        }
        record_event(&mut tx, id, "status", status.as_str()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn heartbeat(&self, handle: &str, at: DateTime<Utc>) -> OrchestratorResult<()> {
        let result = sqlx::query(
            "UPDATE workers SET last_heartbeat = ? WHERE handle = ? AND dismissed_at IS NULL",
        )
        .bind(fmt_datetime(at))
        .bind(handle)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "worker",
                id: handle.to_string(),
            });
        }
        Ok(())
    }

    async fn update_pid(&self, id: Uuid, pid: Option<u32>) -> OrchestratorResult<()> {
        sqlx::query("UPDATE workers SET pid = ? WHERE id = ?")
            .bind(pid.map(i64::from))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_worktree(
        &self,
        id: Uuid,
        path: Option<String>,
        branch: Option<String>,
        working_dir: Option<String>,
    ) -> OrchestratorResult<()> {
        sqlx::query(
            "UPDATE workers SET worktree_path = ?, branch = ?,
             working_dir = COALESCE(?, working_dir) WHERE id = ?",
        )
        .bind(path)
        .bind(branch)
        .bind(working_dir)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_restart(&self, id: Uuid) -> OrchestratorResult<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE workers SET restart_count = restart_count + 1 WHERE id = ?
             RETURNING restart_count",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((count,)) => Ok(count as u32),
            None => Err(OrchestratorError::NotFound {
                entity: "worker",
                id: id.to_string(),
            }),
        }
    }

    async fn dismiss(&self, id: Uuid, at: DateTime<Utc>) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE workers SET status = 'dismissed', dismissed_at = ? WHERE id = ?")
            .bind(fmt_datetime(at))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        record_event(&mut tx, id, "dismissed", "").await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_handle(&self, handle: &str) -> OrchestratorResult<u64> {
        let result = sqlx::query("DELETE FROM workers WHERE handle = ?")
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_stale(
        &self,
        older_than_ms: u64,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Worker>> {
        let cutoff = now - Duration::milliseconds(older_than_ms as i64);
        let rows: Vec<WorkerRow> = sqlx::query_as(
            "SELECT * FROM workers WHERE dismissed_at IS NULL
             AND status IN ('pending', 'ready', 'busy')
             AND COALESCE(last_heartbeat, spawned_at) < ?",
        )
        .bind(fmt_datetime(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }

    async fn get_recoverable(&self) -> OrchestratorResult<Vec<Worker>> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            "SELECT * FROM workers WHERE dismissed_at IS NULL
             AND status IN ('pending', 'ready', 'busy')
             ORDER BY spawned_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Worker::try_from).collect()
    }
}
