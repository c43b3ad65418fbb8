//! Checkpoint repository port.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Checkpoint, CheckpointStatus};

/// Filter criteria for listing checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFilter {
    pub role: Option<String>,
    pub status: Option<CheckpointStatus>,
    pub limit: Option<usize>,
}

/// Repository interface for checkpoint persistence.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Persist a checkpoint, returning its assigned id.
    async fn create(&self, checkpoint: &Checkpoint) -> OrchestratorResult<i64>;

    async fn load(&self, id: i64) -> OrchestratorResult<Option<Checkpoint>>;

    /// Highest-id checkpoint addressed to the handle, regardless of status.
    async fn load_latest(&self, handle: &str) -> OrchestratorResult<Option<Checkpoint>>;

    /// Checkpoints addressed to the handle, newest first.
    async fn list(&self, handle: &str, filter: &CheckpointFilter)
        -> OrchestratorResult<Vec<Checkpoint>>;

    /// Accept; true only when previously pending.
    async fn accept(&self, id: i64) -> OrchestratorResult<bool>;

    /// Reject; true only when previously pending.
    async fn reject(&self, id: i64) -> OrchestratorResult<bool>;
}
