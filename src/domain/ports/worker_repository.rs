//! Worker repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Worker, WorkerRole, WorkerStatus};

/// Filter criteria for listing workers.
#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub status: Option<WorkerStatus>,
    pub role: Option<WorkerRole>,
    pub swarm_id: Option<String>,
    /// Include dismissed workers in the listing
    pub include_dismissed: bool,
}

/// Repository interface for Worker persistence.
///
/// Every method is a single transaction from the caller's standpoint.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// Insert a new worker. Fails when a live worker holds the same handle.
    async fn insert(&self, worker: &Worker) -> OrchestratorResult<()>;

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Worker>>;

    /// Get the newest worker record for a handle, dismissed or not.
    async fn get_by_handle(&self, handle: &str) -> OrchestratorResult<Option<Worker>>;

    /// Get the live (non-dismissed) worker for a handle, if any.
    async fn get_live_by_handle(&self, handle: &str) -> OrchestratorResult<Option<Worker>>;

    async fn list(&self, filter: WorkerFilter) -> OrchestratorResult<Vec<Worker>>;

    /// Count non-dismissed workers.
    async fn count_live(&self) -> OrchestratorResult<usize>;

    async fn update_status(&self, id: Uuid, status: WorkerStatus) -> OrchestratorResult<()>;

    /// Record a heartbeat instant.
    async fn heartbeat(&self, handle: &str, at: DateTime<Utc>) -> OrchestratorResult<()>;

    async fn update_pid(&self, id: Uuid, pid: Option<u32>) -> OrchestratorResult<()>;

    async fn update_worktree(
        &self,
        id: Uuid,
        path: Option<String>,
        branch: Option<String>,
        working_dir: Option<String>,
    ) -> OrchestratorResult<()>;

    /// Increment the restart counter, returning the new value.
    async fn increment_restart(&self, id: Uuid) -> OrchestratorResult<u32>;

    /// Soft-dismiss: set status and `dismissed_at`, freeing the handle.
    async fn dismiss(&self, id: Uuid, at: DateTime<Utc>) -> OrchestratorResult<()>;

    /// Hard-delete every record for a handle. Administrative escape hatch.
    async fn delete_by_handle(&self, handle: &str) -> OrchestratorResult<u64>;

    /// Live workers whose heartbeat is older than the threshold.
    async fn get_stale(&self, older_than_ms: u64, now: DateTime<Utc>)
        -> OrchestratorResult<Vec<Worker>>;

    /// Workers in a recoverable state (pending, ready, busy).
    async fn get_recoverable(&self) -> OrchestratorResult<Vec<Worker>>;
}
