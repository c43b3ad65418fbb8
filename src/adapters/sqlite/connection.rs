//! Database connection pool manager.
//!
//! Manages the SQLite connection pool with WAL mode enabled for better
//! concurrency, and applies embedded migrations at startup.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

use super::migrations::{all_embedded_migrations, Migrator};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Create a new connection pool with WAL mode enabled.
    ///
    /// `database_url` is a SQLite URL such as `sqlite:.flotilla/flotilla.db`
    /// or `sqlite::memory:`.
    pub async fn new(database_url: &str, max_connections: u32) -> OrchestratorResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrchestratorError::StorageIo(format!("invalid database URL: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                OrchestratorError::StorageIo(format!("failed to create connection pool: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Apply all pending embedded migrations. Safe to call repeatedly.
    pub async fn migrate(&self) -> OrchestratorResult<()> {
        Migrator::new(self.pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_and_migration() {
        let db = DatabaseConnection::new("sqlite::memory:", 5)
            .await
            .expect("failed to create database connection");

        db.migrate().await.expect("failed to run migrations");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .expect("failed to query tables");

        let names: Vec<String> = tables.into_iter().map(|t| t.0).collect();
        for table in ["workers", "blackboard", "mail", "checkpoints", "spawn_queue", "swarms"] {
            assert!(names.contains(&table.to_string()), "{table} table should exist");
        }

        db.close().await;
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = DatabaseConnection::new("sqlite::memory:", 5)
            .await
            .expect("failed to create database connection");

        db.migrate().await.expect("first migration run");
        db.migrate().await.expect("second migration run");

        db.close().await;
    }
}
