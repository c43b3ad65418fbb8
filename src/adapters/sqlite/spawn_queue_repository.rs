//! SQLite implementation of the SpawnQueueRepository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{SpawnQueueItem, SpawnStatus, WorkerRole};
use crate::domain::ports::spawn_queue_repository::SpawnQueueRepository;

use super::utils::{fmt_datetime, parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteSpawnQueueRepository {
    pool: SqlitePool,
}

impl SqliteSpawnQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn deps_for(&self, ids: &[String]) -> OrchestratorResult<HashMap<String, Vec<Uuid>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = ids
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT item_id, depends_on FROM spawn_queue_deps WHERE item_id IN ({placeholders})"
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut deps: HashMap<String, Vec<Uuid>> = HashMap::new();
        for (item_id, dep) in rows {
            deps.entry(item_id).or_default().push(parse_uuid(&dep)?);
        }
        Ok(deps)
    }

    async fn hydrate(&self, rows: Vec<ItemRow>) -> OrchestratorResult<Vec<SpawnQueueItem>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut deps = self.deps_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let depends_on = deps.remove(&row.id).unwrap_or_default();
                row.into_item(depends_on)
            })
            .collect()
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: String,
    requester_handle: String,
    target_role: String,
    depth: i64,
    task: String,
    context: Option<String>,
    priority: i64,
    swarm_id: Option<String>,
    status: String,
    worker_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn into_item(self, depends_on: Vec<Uuid>) -> OrchestratorResult<SpawnQueueItem> {
        let target_role = WorkerRole::parse_str(&self.target_role).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad role '{}'", self.target_role))
        })?;
        let status = SpawnStatus::parse_str(&self.status).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad spawn status '{}'", self.status))
        })?;
        Ok(SpawnQueueItem {
            id: parse_uuid(&self.id)?,
            requester_handle: self.requester_handle,
            target_role,
            depth: self.depth as u32,
            task: self.task,
            context: self
                .context
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            priority: self.priority as u8,
            depends_on,
            swarm_id: self.swarm_id,
            status,
            worker_id: self.worker_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl SpawnQueueRepository for SqliteSpawnQueueRepository {
    async fn insert(&self, item: &SpawnQueueItem) -> OrchestratorResult<()> {
        let context = item
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO spawn_queue (id, requester_handle, target_role, depth, task,
               context, priority, swarm_id, status, worker_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
        )
        .bind(item.id.to_string())
        .bind(&item.requester_handle)
        .bind(item.target_role.as_str())
        .bind(item.depth as i64)
        .bind(&item.task)
        .bind(&context)
        .bind(i64::from(item.priority))
        .bind(&item.swarm_id)
        .bind(item.status.as_str())
        .bind(fmt_datetime(item.created_at))
        .bind(fmt_datetime(item.updated_at))
        .execute(&mut *tx)
        .await?;

        for dep in &item.depends_on {
            sqlx::query("INSERT INTO spawn_queue_deps (item_id, depends_on) VALUES (?, ?)")
                .bind(item.id.to_string())
                .bind(dep.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<SpawnQueueItem>> {
        let row: Option<ItemRow> = sqlx::query_as("SELECT * FROM spawn_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(vec![row]).await?.remove(0))),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> OrchestratorResult<Vec<SpawnQueueItem>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as("SELECT * FROM spawn_queue ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await?;
        self.hydrate(rows).await
    }

    async fn list_by_status(
        &self,
        status: SpawnStatus,
    ) -> OrchestratorResult<Vec<SpawnQueueItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT * FROM spawn_queue WHERE status = ?
             ORDER BY priority DESC, created_at ASC, rowid ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn update_status(&self, id: Uuid, status: SpawnStatus) -> OrchestratorResult<()> {
        let result = sqlx::query("UPDATE spawn_queue SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(fmt_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "spawn queue item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_spawned(&self, id: Uuid, worker_id: Uuid) -> OrchestratorResult<()> {
        let result = sqlx::query(
            "UPDATE spawn_queue SET status = 'spawned', worker_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(worker_id.to_string())
        .bind(fmt_datetime(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "spawn queue item",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn add_dependency(&self, item_id: Uuid, depends_on: Uuid) -> OrchestratorResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO spawn_queue_deps (item_id, depends_on) VALUES (?, ?)",
        )
        .bind(item_id.to_string())
        .bind(depends_on.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_dependents(&self, id: Uuid) -> OrchestratorResult<Vec<Uuid>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT item_id FROM spawn_queue_deps WHERE depends_on = ?")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(s,)| parse_uuid(&s)).collect()
    }
}
