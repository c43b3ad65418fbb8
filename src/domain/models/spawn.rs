//! Spawn-queue domain model.
//!
//! Workers request new workers through a durable queue rather than spawning
//! directly. Items form a dependency DAG; the scheduler approves an item only
//! once every dependency has produced a worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker::WorkerRole;

/// State of a spawn-queue item. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnStatus {
    /// Dependencies unmet or not yet evaluated
    Pending,
    /// All dependencies spawned; awaiting a consumer and an open slot
    Approved,
    /// Explicitly blocked by a policy decision, retryable
    Blocked,
    /// Produced a worker
    Spawned,
    /// Vetoed or cancelled; terminal
    Rejected,
}

impl SpawnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Blocked => "blocked",
            Self::Spawned => "spawned",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "blocked" => Some(Self::Blocked),
            "spawned" => Some(Self::Spawned),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Spawned | Self::Rejected)
    }
}

impl std::fmt::Display for SpawnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued request to spawn a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnQueueItem {
    /// Unique identifier
    pub id: Uuid,
    /// Handle of the requesting worker
    pub requester_handle: String,
    /// Role the new worker should take
    pub target_role: WorkerRole,
    /// Spawn-chain depth of the requested worker (requester depth + 1)
    pub depth: u32,
    /// Initial task text for the new worker
    pub task: String,
    /// Optional context blob handed to the new worker
    pub context: Option<serde_json::Value>,
    /// Higher dequeues first; ties break by insertion order
    pub priority: u8,
    /// Queue items that must reach `spawned` before this one is approved
    pub depends_on: Vec<Uuid>,
    pub swarm_id: Option<String>,
    pub status: SpawnStatus,
    /// The worker this item produced, once spawned
    pub worker_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SpawnQueueItem {
    pub fn new(
        requester_handle: impl Into<String>,
        target_role: WorkerRole,
        depth: u32,
        task: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_handle: requester_handle.into(),
            target_role,
            depth,
            task: task.into(),
            context: None,
            priority: 1,
            depends_on: Vec::new(),
            swarm_id: None,
            status: SpawnStatus::Pending,
            worker_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<Uuid>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_swarm(mut self, swarm_id: impl Into<String>) -> Self {
        self.swarm_id = Some(swarm_id.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}
