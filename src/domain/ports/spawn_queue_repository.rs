//! Spawn-queue repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{SpawnQueueItem, SpawnStatus};

/// Repository interface for spawn-queue persistence.
#[async_trait]
pub trait SpawnQueueRepository: Send + Sync {
    /// Insert an item together with its dependency edges.
    async fn insert(&self, item: &SpawnQueueItem) -> OrchestratorResult<()>;

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<SpawnQueueItem>>;

    /// All items, dependency edges populated.
    async fn list_all(&self) -> OrchestratorResult<Vec<SpawnQueueItem>>;

    /// Items in the given status, priority descending then insertion order.
    async fn list_by_status(&self, status: SpawnStatus)
        -> OrchestratorResult<Vec<SpawnQueueItem>>;

    async fn update_status(&self, id: Uuid, status: SpawnStatus) -> OrchestratorResult<()>;

    /// Record the worker an item produced and move it to `spawned`.
    async fn mark_spawned(&self, id: Uuid, worker_id: Uuid) -> OrchestratorResult<()>;

    /// Add a dependency edge. Integrity (cycle) checks live in the scheduler.
    async fn add_dependency(&self, item_id: Uuid, depends_on: Uuid) -> OrchestratorResult<()>;

    /// Ids of items that depend on the given item.
    async fn get_dependents(&self, id: Uuid) -> OrchestratorResult<Vec<Uuid>>;
}
