//! SQLite implementation of the MailRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Handoff, MailMessage};
use crate::domain::ports::mail_repository::MailRepository;

use super::utils::{fmt_datetime, parse_datetime, parse_opt_datetime};

#[derive(Clone)]
pub struct SqliteMailRepository {
    pool: SqlitePool,
}

impl SqliteMailRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct MailRow {
    id: i64,
    from_handle: String,
    to_handle: String,
    subject: Option<String>,
    body: String,
    created_at: String,
    read_at: Option<String>,
}

impl TryFrom<MailRow> for MailMessage {
    type Error = crate::domain::errors::OrchestratorError;

    fn try_from(row: MailRow) -> Result<Self, Self::Error> {
        Ok(MailMessage {
            id: row.id,
            from_handle: row.from_handle,
            to_handle: row.to_handle,
            subject: row.subject,
            body: row.body,
            created_at: parse_datetime(&row.created_at)?,
            read_at: parse_opt_datetime(row.read_at.as_deref())?,
        })
    }
}

#[derive(FromRow)]
struct HandoffRow {
    id: i64,
    from_handle: String,
    to_handle: String,
    context: String,
    created_at: String,
    accepted_at: Option<String>,
}

impl TryFrom<HandoffRow> for Handoff {
    type Error = crate::domain::errors::OrchestratorError;

    fn try_from(row: HandoffRow) -> Result<Self, Self::Error> {
        Ok(Handoff {
            id: row.id,
            from_handle: row.from_handle,
            to_handle: row.to_handle,
            context: serde_json::from_str(&row.context)?,
            created_at: parse_datetime(&row.created_at)?,
            accepted_at: parse_opt_datetime(row.accepted_at.as_deref())?,
        })
    }
}

#[async_trait]
impl MailRepository for SqliteMailRepository {
    async fn send(&self, message: &MailMessage) -> OrchestratorResult<i64> {
        let result = sqlx::query(
            "INSERT INTO mail (from_handle, to_handle, subject, body, created_at, read_at)
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(&message.from_handle)
        .bind(&message.to_handle)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(fmt_datetime(message.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> OrchestratorResult<Option<MailMessage>> {
        let row: Option<MailRow> = sqlx::query_as("SELECT * FROM mail WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(MailMessage::try_from).transpose()
    }

    async fn get_unread(&self, handle: &str) -> OrchestratorResult<Vec<MailMessage>> {
        let rows: Vec<MailRow> = sqlx::query_as(
            "SELECT * FROM mail WHERE to_handle = ? AND read_at IS NULL ORDER BY id ASC",
        )
        .bind(handle)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MailMessage::try_from).collect()
    }

    async fn get_all(&self, handle: &str, limit: usize) -> OrchestratorResult<Vec<MailMessage>> {
        let rows: Vec<MailRow> = sqlx::query_as(
            "SELECT * FROM mail WHERE to_handle = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(handle)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(MailMessage::try_from).collect()
    }

    async fn mark_read(&self, id: i64) -> OrchestratorResult<bool> {
        let result = sqlx::query("UPDATE mail SET read_at = ? WHERE id = ? AND read_at IS NULL")
            .bind(fmt_datetime(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(&self, handle: &str) -> OrchestratorResult<u64> {
        let result = sqlx::query(
            "UPDATE mail SET read_at = ? WHERE to_handle = ? AND read_at IS NULL",
        )
        .bind(fmt_datetime(Utc::now()))
        .bind(handle)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_handoff(&self, handoff: &Handoff) -> OrchestratorResult<i64> {
        let context = serde_json::to_string(&handoff.context)?;
        let result = sqlx::query(
            "INSERT INTO handoffs (from_handle, to_handle, context, created_at, accepted_at)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&handoff.from_handle)
        .bind(&handoff.to_handle)
        .bind(&context)
        .bind(fmt_datetime(handoff.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_handoff(&self, id: i64) -> OrchestratorResult<Option<Handoff>> {
        let row: Option<HandoffRow> = sqlx::query_as("SELECT * FROM handoffs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Handoff::try_from).transpose()
    }

    async fn get_pending_handoffs(&self, handle: &str) -> OrchestratorResult<Vec<Handoff>> {
        let rows: Vec<HandoffRow> = sqlx::query_as(
            "SELECT * FROM handoffs WHERE to_handle = ? AND accepted_at IS NULL ORDER BY id ASC",
        )
        .bind(handle)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Handoff::try_from).collect()
    }

    async fn accept_handoff(&self, id: i64) -> OrchestratorResult<bool> {
        let result = sqlx::query(
            "UPDATE handoffs SET accepted_at = ? WHERE id = ? AND accepted_at IS NULL",
        )
        .bind(fmt_datetime(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
