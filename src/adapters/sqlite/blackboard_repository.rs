//! SQLite implementation of the BlackboardRepository.
//!
//! The visibility rule lives in SQL: a reader sees un-archived, non-expired
//! messages in its swarm that are untargeted, targeted at it, or sent by it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    BlackboardFilter, BlackboardMessage, MessagePriority, MessageType,
};
use crate::domain::ports::blackboard_repository::BlackboardRepository;

use super::utils::{fmt_datetime, parse_datetime, parse_opt_datetime};

#[derive(Clone)]
pub struct SqliteBlackboardRepository {
    pool: SqlitePool,
}

impl SqliteBlackboardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch read marks for a set of message ids, grouped by message.
    async fn read_marks(&self, ids: &[i64]) -> OrchestratorResult<HashMap<i64, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_list = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT message_id, reader_handle FROM blackboard_reads WHERE message_id IN ({id_list})"
        );
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        let mut marks: HashMap<i64, Vec<String>> = HashMap::new();
        for (id, reader) in rows {
            marks.entry(id).or_default().push(reader);
        }
        Ok(marks)
    }

    async fn hydrate(&self, rows: Vec<MessageRow>) -> OrchestratorResult<Vec<BlackboardMessage>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut marks = self.read_marks(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let read_by = marks.remove(&row.id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect()
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    swarm_id: String,
    sender_handle: String,
    target_handle: Option<String>,
    message_type: String,
    priority: i64,
    payload: String,
    created_at: String,
    expires_at: Option<String>,
    archived_at: Option<String>,
}

impl MessageRow {
    fn into_message(self, read_by: Vec<String>) -> OrchestratorResult<BlackboardMessage> {
        let message_type = MessageType::parse_str(&self.message_type).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad message type '{}'", self.message_type))
        })?;
        let priority = MessagePriority::from_i64(self.priority).ok_or_else(|| {
            OrchestratorError::StorageIo(format!("bad priority {}", self.priority))
        })?;
        Ok(BlackboardMessage {
            id: self.id,
            swarm_id: self.swarm_id,
            sender_handle: self.sender_handle,
            target_handle: self.target_handle,
            message_type,
            priority,
            payload: serde_json::from_str(&self.payload)?,
            created_at: parse_datetime(&self.created_at)?,
            expires_at: parse_opt_datetime(self.expires_at.as_deref())?,
            archived_at: parse_opt_datetime(self.archived_at.as_deref())?,
            read_by,
        })
    }
}

#[async_trait]
impl BlackboardRepository for SqliteBlackboardRepository {
    async fn post(&self, message: &BlackboardMessage) -> OrchestratorResult<BlackboardMessage> {
        let payload = serde_json::to_string(&message.payload)?;
        let result = sqlx::query(
            r#"INSERT INTO blackboard (swarm_id, sender_handle, target_handle, message_type,
               priority, payload, created_at, expires_at, archived_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(&message.swarm_id)
        .bind(&message.sender_handle)
        .bind(&message.target_handle)
        .bind(message.message_type.as_str())
        .bind(message.priority.as_i64())
        .bind(&payload)
        .bind(fmt_datetime(message.created_at))
        .bind(message.expires_at.map(fmt_datetime))
        .execute(&self.pool)
        .await?;

        let mut posted = message.clone();
        posted.id = result.last_insert_rowid();
        posted.archived_at = None;
        posted.read_by = Vec::new();
        Ok(posted)
    }

    async fn read(
        &self,
        swarm_id: &str,
        filter: &BlackboardFilter,
    ) -> OrchestratorResult<Vec<BlackboardMessage>> {
        if filter.unread_only && filter.reader_handle.is_none() {
            return Err(OrchestratorError::ValidationFailed(
                "unread_only requires reader_handle".to_string(),
            ));
        }

        let mut sql = String::from(
            "SELECT * FROM blackboard WHERE swarm_id = ? AND archived_at IS NULL
             AND (expires_at IS NULL OR expires_at > ?)",
        );
        if filter.reader_handle.is_some() {
            sql.push_str(
                " AND (target_handle IS NULL OR target_handle = ? OR sender_handle = ?)",
            );
        }
        if filter.message_type.is_some() {
            sql.push_str(" AND message_type = ?");
        }
        if filter.min_priority.is_some() {
            sql.push_str(" AND priority >= ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filter.unread_only {
            sql.push_str(
                " AND id NOT IN (SELECT message_id FROM blackboard_reads WHERE reader_handle = ?)",
            );
        }
        sql.push_str(" ORDER BY priority DESC, created_at DESC, id DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(swarm_id)
            .bind(fmt_datetime(Utc::now()));
        if let Some(reader) = &filter.reader_handle {
            query = query.bind(reader).bind(reader);
        }
        if let Some(message_type) = filter.message_type {
            query = query.bind(message_type.as_str());
        }
        if let Some(min_priority) = filter.min_priority {
            query = query.bind(min_priority.as_i64());
        }
        if let Some(since) = filter.since {
            query = query.bind(fmt_datetime(since));
        }
        if filter.unread_only {
            // Checked above.
            query = query.bind(filter.reader_handle.as_deref().unwrap_or_default());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn read_after(
        &self,
        swarm_id: &str,
        last_seen_id: i64,
        limit: usize,
    ) -> OrchestratorResult<Vec<BlackboardMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM blackboard WHERE swarm_id = ? AND id > ? AND archived_at IS NULL
             AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY id ASC LIMIT ?",
        )
        .bind(swarm_id)
        .bind(last_seen_id)
        .bind(fmt_datetime(Utc::now()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn mark_read(&self, ids: &[i64], reader: &str) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = fmt_datetime(Utc::now());
        for id in ids {
            sqlx::query(
                "INSERT OR IGNORE INTO blackboard_reads (message_id, reader_handle, read_at)
                 VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(reader)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn archive(&self, ids: &[i64]) -> OrchestratorResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let id_list = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "UPDATE blackboard SET archived_at = ? WHERE id IN ({id_list}) AND archived_at IS NULL"
        );
        let result = sqlx::query(&sql)
            .bind(fmt_datetime(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn archive_old(
        &self,
        swarm_id: &str,
        max_age_ms: u64,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<u64> {
        let cutoff = now - Duration::milliseconds(max_age_ms as i64);
        let result = sqlx::query(
            "UPDATE blackboard SET archived_at = ?
             WHERE swarm_id = ? AND archived_at IS NULL AND created_at < ?",
        )
        .bind(fmt_datetime(now))
        .bind(swarm_id)
        .bind(fmt_datetime(cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn unread_count(&self, swarm_id: &str, reader: &str) -> OrchestratorResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM blackboard
             WHERE swarm_id = ? AND archived_at IS NULL
             AND (expires_at IS NULL OR expires_at > ?)
             AND (target_handle IS NULL OR target_handle = ? OR sender_handle = ?)
             AND id NOT IN (SELECT message_id FROM blackboard_reads WHERE reader_handle = ?)",
        )
        .bind(swarm_id)
        .bind(fmt_datetime(Utc::now()))
        .bind(reader)
        .bind(reader)
        .bind(reader)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
