//! SQLite implementations of the task and work-item repositories.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Batch, Task, TaskStatus, WorkItem, WorkItemStatus};
use crate::domain::ports::task_repository::{TaskFilter, TaskRepository, WorkItemRepository};

use super::utils::{fmt_datetime, parse_datetime, parse_opt_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn encode_blocked_by(blocked_by: &[Uuid]) -> OrchestratorResult<Option<String>> {
    if blocked_by.is_empty() {
        return Ok(None);
    }
    let ids: Vec<String> = blocked_by.iter().map(ToString::to_string).collect();
    Ok(Some(serde_json::to_string(&ids)?))
}

fn decode_blocked_by(raw: Option<&str>) -> OrchestratorResult<Vec<Uuid>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let ids: Vec<String> = serde_json::from_str(raw)?;
    ids.iter().map(|s| parse_uuid(s)).collect()
}

#[derive(FromRow)]
struct TaskRow {
    id: String,
    subject: String,
    status: String,
    owner: Option<String>,
    blocked_by: Option<String>,
    team: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = OrchestratorError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse_str(&row.status).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad task status '{}'", row.status))
        })?;
        Ok(Task {
            id: parse_uuid(&row.id)?,
            subject: row.subject,
            status,
            owner: row.owner,
            blocked_by: decode_blocked_by(row.blocked_by.as_deref())?,
            team: row.team,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> OrchestratorResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (id, subject, status, owner, blocked_by, team,
               created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.subject)
        .bind(task.status.as_str())
        .bind(&task.owner)
        .bind(encode_blocked_by(&task.blocked_by)?)
        .bind(&task.team)
        .bind(fmt_datetime(task.created_at))
        .bind(fmt_datetime(task.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> OrchestratorResult<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.owner.is_some() {
            sql.push_str(" AND owner = ?");
        }
        if filter.team.is_some() {
            sql.push_str(" AND team = ?");
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(owner) = filter.owner {
            query = query.bind(owner);
        }
        if let Some(team) = filter.team {
            query = query.bind(team);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(fmt_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn assign(&self, id: Uuid, owner: Option<String>) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE tasks SET owner = ?, updated_at = ? WHERE id = ?")
            .bind(owner)
            .bind(fmt_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_blocked_by(&self, id: Uuid, blocked_by: &[Uuid]) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE tasks SET blocked_by = ?, updated_at = ? WHERE id = ?")
            .bind(encode_blocked_by(blocked_by)?)
            .bind(fmt_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "task",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteWorkItemRepository {
    pool: SqlitePool,
}

impl SqliteWorkItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BatchRow {
    id: String,
    name: String,
    created_at: String,
    dispatched_at: Option<String>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = OrchestratorError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(Batch {
            id: parse_uuid(&row.id)?,
            name: row.name,
            created_at: parse_datetime(&row.created_at)?,
            dispatched_at: parse_opt_datetime(row.dispatched_at.as_deref())?,
        })
    }
}

#[derive(FromRow)]
struct WorkItemRow {
    id: String,
    batch_id: Option<String>,
    subject: String,
    status: String,
    owner: Option<String>,
    blocked_by: Option<String>,
    team: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = OrchestratorError;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        let status = WorkItemStatus::parse_str(&row.status).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad work item status '{}'", row.status))
        })?;
        Ok(WorkItem {
            id: parse_uuid(&row.id)?,
            batch_id: row.batch_id.as_deref().map(parse_uuid).transpose()?,
            subject: row.subject,
            status,
            owner: row.owner,
            blocked_by: decode_blocked_by(row.blocked_by.as_deref())?,
            team: row.team,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl WorkItemRepository for SqliteWorkItemRepository {
    async fn create_batch(&self, batch: &Batch) -> OrchestratorResult<()> {
        sqlx::query(
            "INSERT INTO batches (id, name, created_at, dispatched_at) VALUES (?, ?, ?, ?)",
        )
        .bind(batch.id.to_string())
        .bind(&batch.name)
        .bind(fmt_datetime(batch.created_at))
        .bind(batch.dispatched_at.map(fmt_datetime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> OrchestratorResult<Option<Batch>> {
        let row: Option<BatchRow> = sqlx::query_as("SELECT * FROM batches WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Batch::try_from).transpose()
    }

    async fn create_item(&self, item: &WorkItem) -> OrchestratorResult<()> {
        sqlx::query(
            r#"INSERT INTO work_items (id, batch_id, subject, status, owner, blocked_by,
               team, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(item.id.to_string())
        .bind(item.batch_id.map(|id| id.to_string()))
        .bind(&item.subject)
        .bind(item.status.as_str())
        .bind(&item.owner)
        .bind(encode_blocked_by(&item.blocked_by)?)
        .bind(&item.team)
        .bind(fmt_datetime(item.created_at))
        .bind(fmt_datetime(item.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> OrchestratorResult<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as("SELECT * FROM work_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkItem::try_from).transpose()
    }

    async fn list_items(&self, batch_id: Uuid) -> OrchestratorResult<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT * FROM work_items WHERE batch_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkItem::try_from).collect()
    }

    async fn update_item_status(
        &self,
        id: Uuid,
        status: WorkItemStatus,
    ) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE work_items SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(fmt_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "work item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn dispatch_batch(&self, batch_id: Uuid) -> OrchestratorResult<u64> {
        let now = fmt_datetime(Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE work_items SET status = 'in_progress', updated_at = ?
             WHERE batch_id = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(batch_id.to_string())
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query("UPDATE batches SET dispatched_at = ? WHERE id = ?")
            .bind(&now)
            .bind(batch_id.to_string())
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "batch",
                id: batch_id.to_string(),
            });
        }

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
