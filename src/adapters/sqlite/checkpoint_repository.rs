//! SQLite implementation of the CheckpointRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Checkpoint, CheckpointBody, CheckpointStatus};
use crate::domain::ports::checkpoint_repository::{CheckpointFilter, CheckpointRepository};

use super::utils::{fmt_datetime, parse_datetime, parse_opt_datetime};

#[derive(Clone)]
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct CheckpointRow {
    id: i64,
    from_handle: String,
    to_handle: String,
    role: Option<String>,
    body: String,
    status: String,
    created_at: String,
    accepted_at: Option<String>,
    rejected_at: Option<String>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = OrchestratorError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let status = CheckpointStatus::parse_str(&row.status).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad checkpoint status '{}'", row.status))
        })?;
        let body: CheckpointBody = serde_json::from_str(&row.body)?;
        Ok(Checkpoint {
            id: row.id,
            from_handle: row.from_handle,
            to_handle: row.to_handle,
            role: row.role,
            body,
            status,
            created_at: parse_datetime(&row.created_at)?,
            accepted_at: parse_opt_datetime(row.accepted_at.as_deref())?,
            rejected_at: parse_opt_datetime(row.rejected_at.as_deref())?,
        })
    }
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn create(&self, checkpoint: &Checkpoint) -> OrchestratorResult<i64> {
        let body = serde_json::to_string(&checkpoint.body)?;
        let result = sqlx::query(
            r#"INSERT INTO checkpoints (from_handle, to_handle, role, goal, body, status,
               created_at, accepted_at, rejected_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL)"#,
        )
        .bind(&checkpoint.from_handle)
        .bind(&checkpoint.to_handle)
        .bind(&checkpoint.role)
        .bind(&checkpoint.body.goal)
        .bind(&body)
        .bind(checkpoint.status.as_str())
        .bind(fmt_datetime(checkpoint.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn load(&self, id: i64) -> OrchestratorResult<Option<Checkpoint>> {
        let row: Option<CheckpointRow> =
            sqlx::query_as("SELECT * FROM checkpoints WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Checkpoint::try_from).transpose()
    }

    async fn load_latest(&self, handle: &str) -> OrchestratorResult<Option<Checkpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT * FROM checkpoints WHERE to_handle = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Checkpoint::try_from).transpose()
    }

    async fn list(
        &self,
        handle: &str,
        filter: &CheckpointFilter,
    ) -> OrchestratorResult<Vec<Checkpoint>> {
        let mut sql = String::from("SELECT * FROM checkpoints WHERE to_handle = ?");
        if filter.role.is_some() {
            sql.push_str(" AND role = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, CheckpointRow>(&sql).bind(handle);
        if let Some(role) = &filter.role {
            query = query.bind(role);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Checkpoint::try_from).collect()
    }

    async fn accept(&self, id: i64) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE checkpoints SET status = 'accepted', accepted_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(fmt_datetime(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reject(&self, id: i64) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE checkpoints SET status = 'rejected', rejected_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(fmt_datetime(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
