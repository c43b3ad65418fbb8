//! In-process lifecycle events.
//!
//! Events are not persisted; they fan out synchronously through the event bus
//! and over a broadcast channel for async subscribers. The set is closed to
//! avoid stringly-typed dispatch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse event family, used for handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkerSpawned,
    WorkerReady,
    WorkerOutput,
    WorkerStale,
    WorkerRecovered,
    WorkerError,
    WorkerExited,
    WorkerDismissed,
    WorkerSuccess,
    WorkerFailed,
    WaveStart,
    WaveComplete,
    SpawnQueued,
    SpawnReady,
    SpawnRejected,
    BlackboardPosted,
    MailDelivered,
    AuditBlocked,
}

/// A lifecycle event with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    WorkerSpawned {
        worker_id: Uuid,
        handle: String,
    },
    WorkerReady {
        handle: String,
    },
    /// One decoded line of worker output. Best-effort observation only.
    WorkerOutput {
        handle: String,
        line: String,
    },
    WorkerStale {
        handle: String,
    },
    WorkerRecovered {
        handle: String,
        restart_count: u32,
    },
    WorkerError {
        handle: String,
        reason: String,
    },
    WorkerExited {
        handle: String,
        exit_code: Option<i32>,
    },
    WorkerDismissed {
        handle: String,
    },
    WorkerSuccess {
        handle: String,
        wave: String,
    },
    WorkerFailed {
        handle: String,
        wave: String,
        reason: String,
    },
    WaveStart {
        wave: String,
        iteration: u32,
    },
    WaveComplete {
        wave: String,
        succeeded: usize,
        failed: usize,
    },
    SpawnQueued {
        item_id: Uuid,
        requester: String,
    },
    SpawnReady {
        item_id: Uuid,
    },
    SpawnRejected {
        item_id: Uuid,
        reason: String,
    },
    BlackboardPosted {
        message_id: i64,
        swarm_id: String,
        sender: String,
    },
    MailDelivered {
        mail_id: i64,
        to_handle: String,
    },
    /// A hook blocked a proposed operation.
    AuditBlocked {
        hook_id: String,
        handle: Option<String>,
        reason: String,
    },
}

impl OrchestratorEvent {
    /// The family this event belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::WorkerSpawned { .. } => EventKind::WorkerSpawned,
            Self::WorkerReady { .. } => EventKind::WorkerReady,
            Self::WorkerOutput { .. } => EventKind::WorkerOutput,
            Self::WorkerStale { .. } => EventKind::WorkerStale,
            Self::WorkerRecovered { .. } => EventKind::WorkerRecovered,
            Self::WorkerError { .. } => EventKind::WorkerError,
            Self::WorkerExited { .. } => EventKind::WorkerExited,
            Self::WorkerDismissed { .. } => EventKind::WorkerDismissed,
            Self::WorkerSuccess { .. } => EventKind::WorkerSuccess,
            Self::WorkerFailed { .. } => EventKind::WorkerFailed,
            Self::WaveStart { .. } => EventKind::WaveStart,
            Self::WaveComplete { .. } => EventKind::WaveComplete,
            Self::SpawnQueued { .. } => EventKind::SpawnQueued,
            Self::SpawnReady { .. } => EventKind::SpawnReady,
            Self::SpawnRejected { .. } => EventKind::SpawnRejected,
            Self::BlackboardPosted { .. } => EventKind::BlackboardPosted,
            Self::MailDelivered { .. } => EventKind::MailDelivered,
            Self::AuditBlocked { .. } => EventKind::AuditBlocked,
        }
    }
}
