//! Checkpoint service.

use chrono::Utc;
use tracing::instrument;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Caller, Checkpoint, CheckpointBody, CheckpointStatus};
use crate::domain::ports::{CheckpointFilter, Storage};

pub struct CheckpointService {
    storage: Storage,
}

impl CheckpointService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Create a checkpoint from `from` to `to`. `goal` is required.
    #[instrument(skip(self, body))]
    pub async fn create(
        &self,
        from: &str,
        to: &str,
        role: Option<String>,
        body: CheckpointBody,
    ) -> OrchestratorResult<i64> {
        body.validate().map_err(OrchestratorError::ValidationFailed)?;
        let checkpoint = Checkpoint {
            id: 0,
            from_handle: from.to_string(),
            to_handle: to.to_string(),
            role,
            body,
            status: CheckpointStatus::Pending,
            created_at: Utc::now(),
            accepted_at: None,
            rejected_at: None,
        };
        self.storage.checkpoints.create(&checkpoint).await
    }

    /// Caller-facing create: self-only, except team leads.
    pub async fn create_as(
        &self,
        caller: &Caller,
        from: &str,
        to: &str,
        role: Option<String>,
        body: CheckpointBody,
    ) -> OrchestratorResult<i64> {
        if !caller.can_checkpoint_as(from) {
            return Err(OrchestratorError::AccessDenied {
                handle: caller.handle.clone(),
                reason: format!("cannot create checkpoints on behalf of {from}"),
            });
        }
        self.create(from, to, role, body).await
    }

    pub async fn load(&self, id: i64) -> OrchestratorResult<Option<Checkpoint>> {
        self.storage.checkpoints.load(id).await
    }

    /// Latest checkpoint addressed to a handle, regardless of status.
    pub async fn load_latest(&self, handle: &str) -> OrchestratorResult<Option<Checkpoint>> {
        self.storage.checkpoints.load_latest(handle).await
    }

    pub async fn list(
        &self,
        handle: &str,
        filter: CheckpointFilter,
    ) -> OrchestratorResult<Vec<Checkpoint>> {
        self.storage.checkpoints.list(handle, &filter).await
    }

    /// True only if the checkpoint was pending. At-most-once.
    pub async fn accept(&self, id: i64) -> OrchestratorResult<bool> {
        self.storage.checkpoints.accept(id).await
    }

    /// True only if the checkpoint was pending. At-most-once.
    pub async fn reject(&self, id: i64) -> OrchestratorResult<bool> {
        self.storage.checkpoints.reject(id).await
    }
}
