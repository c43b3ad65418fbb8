//! SQLite implementation of the SwarmRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::Swarm;
use crate::domain::ports::swarm_repository::SwarmRepository;

use super::utils::{fmt_datetime, parse_datetime, parse_opt_datetime};

#[derive(Clone)]
pub struct SqliteSwarmRepository {
    pool: SqlitePool,
}

impl SqliteSwarmRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SwarmRow {
    id: String,
    name: String,
    max_agents: i64,
    created_at: String,
    deleted_at: Option<String>,
}

impl TryFrom<SwarmRow> for Swarm {
    type Error = OrchestratorError;

    fn try_from(row: SwarmRow) -> Result<Self, Self::Error> {
        Ok(Swarm {
            id: row.id,
            name: row.name,
            max_agents: row.max_agents as u32,
            created_at: parse_datetime(&row.created_at)?,
            deleted_at: parse_opt_datetime(row.deleted_at.as_deref())?,
        })
    }
}

#[async_trait]
impl SwarmRepository for SqliteSwarmRepository {
    async fn create(&self, swarm: &Swarm) -> OrchestratorResult<()> {
        sqlx::query(
            "INSERT INTO swarms (id, name, max_agents, created_at, deleted_at)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&swarm.id)
        .bind(&swarm.name)
        .bind(i64::from(swarm.max_agents))
        .bind(fmt_datetime(swarm.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> OrchestratorResult<Option<Swarm>> {
        let row: Option<SwarmRow> =
            sqlx::query_as("SELECT * FROM swarms WHERE id = ? AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Swarm::try_from).transpose()
    }

    async fn get_by_name(&self, name: &str) -> OrchestratorResult<Option<Swarm>> {
        let row: Option<SwarmRow> = sqlx::query_as(
            "SELECT * FROM swarms WHERE name = ? AND deleted_at IS NULL
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Swarm::try_from).transpose()
    }

    async fn list(&self) -> OrchestratorResult<Vec<Swarm>> {
        let rows: Vec<SwarmRow> = sqlx::query_as(
            "SELECT * FROM swarms WHERE deleted_at IS NULL ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Swarm::try_from).collect()
    }

    async fn delete(&self, id: &str) -> OrchestratorResult<()> {
        let result =
            sqlx::query("UPDATE swarms SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(fmt_datetime(Utc::now()))
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "swarm",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
