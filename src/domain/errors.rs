//! Domain errors for the flotilla orchestrator.
//!
//! The taxonomy is stable: transport adapters surface these kinds to callers
//! unchanged, so every failure carries enough context (handle, id, kind,
//! message) to display, retry, or route to a human.

use thiserror::Error;

/// Orchestrator-level errors surfaced uniformly to callers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A live (non-dismissed) worker already holds this handle.
    #[error("Handle already taken: {0}")]
    HandleTaken(String),

    /// The fleet is at its configured worker capacity.
    #[error("Worker capacity exceeded: {current} of {max}")]
    CapacityExceeded { current: usize, max: usize },

    /// A spawn request exceeds the configured spawn-chain depth.
    #[error("Spawn depth {depth} exceeds maximum {max}")]
    DepthExceeded { depth: u32, max: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state for {entity} {id}: {reason}")]
    InvalidState {
        entity: &'static str,
        id: String,
        reason: String,
    },

    #[error("Access denied for {handle}: {reason}")]
    AccessDenied { handle: String, reason: String },

    /// Worktree or branch provisioning failed.
    #[error("Worktree operation failed for {worker_id}: {reason}")]
    WorktreeCreate { worker_id: String, reason: String },

    /// The worker subprocess could not be launched.
    #[error("Failed to spawn worker {handle}: {reason}")]
    SpawnFailed { handle: String, reason: String },

    /// Nothing to commit: the worktree status is clean.
    #[error("No changes to commit in worktree for {0}")]
    NoChanges(String),

    #[error("Storage error: {0}")]
    StorageIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A hook refused the operation. Carries the hook id and its reason.
    #[error("Operation blocked by hook {hook_id}: {reason}")]
    SafetyBlocked { hook_id: String, reason: String },

    /// Cooperative cancellation; no state change beyond what was already
    /// durably committed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Inserting this spawn-queue dependency would form a cycle.
    #[error("Dependency cycle detected involving queue item {0}")]
    DependencyCycle(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::StorageIo(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl OrchestratorError {
    /// Whether the caller can recover by fixing its request (precondition
    /// failures), as opposed to infrastructure failures.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::HandleTaken(_)
                | Self::CapacityExceeded { .. }
                | Self::DepthExceeded { .. }
                | Self::NotFound { .. }
                | Self::InvalidState { .. }
                | Self::AccessDenied { .. }
                | Self::DependencyCycle(_)
                | Self::ValidationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(OrchestratorError::HandleTaken("alice".into()).is_precondition());
        assert!(OrchestratorError::DepthExceeded { depth: 4, max: 3 }.is_precondition());
        assert!(!OrchestratorError::StorageIo("disk full".into()).is_precondition());
        assert!(!OrchestratorError::Cancelled.is_precondition());
    }

    #[test]
    fn test_display_carries_context() {
        let err = OrchestratorError::SafetyBlocked {
            hook_id: "block-root-delete".into(),
            reason: "recursive delete of /".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("block-root-delete"));
        assert!(msg.contains("recursive delete"));
    }
}
