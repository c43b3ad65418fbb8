//! SQLite adapters: the default storage backend.

pub mod blackboard_repository;
pub mod checkpoint_repository;
pub mod connection;
pub mod mail_repository;
pub mod migrations;
pub mod spawn_queue_repository;
pub mod swarm_repository;
pub mod task_repository;
pub mod utils;
pub mod worker_repository;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::domain::ports::Storage;

pub use blackboard_repository::SqliteBlackboardRepository;
pub use checkpoint_repository::SqliteCheckpointRepository;
pub use connection::DatabaseConnection;
pub use mail_repository::SqliteMailRepository;
pub use spawn_queue_repository::SqliteSpawnQueueRepository;
pub use swarm_repository::SqliteSwarmRepository;
pub use task_repository::{SqliteTaskRepository, SqliteWorkItemRepository};
pub use worker_repository::SqliteWorkerRepository;

/// Assemble the full storage capability set over one pool.
pub fn storage_from_pool(pool: &SqlitePool) -> Storage {
    Storage {
        workers: Arc::new(SqliteWorkerRepository::new(pool.clone())),
        swarms: Arc::new(SqliteSwarmRepository::new(pool.clone())),
        blackboard: Arc::new(SqliteBlackboardRepository::new(pool.clone())),
        mail: Arc::new(SqliteMailRepository::new(pool.clone())),
        checkpoints: Arc::new(SqliteCheckpointRepository::new(pool.clone())),
        spawn_queue: Arc::new(SqliteSpawnQueueRepository::new(pool.clone())),
        tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
        work_items: Arc::new(SqliteWorkItemRepository::new(pool.clone())),
    }
}
