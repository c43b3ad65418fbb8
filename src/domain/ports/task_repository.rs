//! Task, work-item, and batch repository ports.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Batch, Task, TaskStatus, WorkItem, WorkItemStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub team: Option<String>,
}

/// Repository interface for task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> OrchestratorResult<()>;

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Task>>;

    async fn list(&self, filter: TaskFilter) -> OrchestratorResult<Vec<Task>>;

    async fn update_status(&self, id: Uuid, status: TaskStatus) -> OrchestratorResult<()>;

    async fn assign(&self, id: Uuid, owner: Option<String>) -> OrchestratorResult<()>;

    async fn set_blocked_by(&self, id: Uuid, blocked_by: &[Uuid]) -> OrchestratorResult<()>;
}

/// Repository interface for work items and batches.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    async fn create_batch(&self, batch: &Batch) -> OrchestratorResult<()>;

    async fn get_batch(&self, id: Uuid) -> OrchestratorResult<Option<Batch>>;

    async fn create_item(&self, item: &WorkItem) -> OrchestratorResult<()>;

    async fn get_item(&self, id: Uuid) -> OrchestratorResult<Option<WorkItem>>;

    async fn list_items(&self, batch_id: Uuid) -> OrchestratorResult<Vec<WorkItem>>;

    async fn update_item_status(&self, id: Uuid, status: WorkItemStatus)
        -> OrchestratorResult<()>;

    /// Atomically move every pending item in the batch to in-progress and
    /// stamp the batch dispatched. Returns the number of items moved.
    async fn dispatch_batch(&self, batch_id: Uuid) -> OrchestratorResult<u64>;
}
