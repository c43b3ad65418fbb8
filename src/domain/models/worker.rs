//! Worker domain model.
//!
//! A worker is one long-running interactive agent subprocess, identified by a
//! generated id plus a human-chosen handle that is unique among non-dismissed
//! workers in the fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a worker within the fleet. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// Coordinates other workers, may checkpoint on their behalf
    Lead,
    /// General task execution
    Worker,
    /// Exploration and reconnaissance
    Scout,
    /// High-level design and decomposition
    Architect,
    /// Reviews and challenges other workers' output
    Critic,
    /// Large multi-part efforts
    Kraken,
    /// Answers questions, holds context
    Oracle,
}

impl Default for WorkerRole {
    fn default() -> Self {
        Self::Worker
    }
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Worker => "worker",
            Self::Scout => "scout",
            Self::Architect => "architect",
            Self::Critic => "critic",
            Self::Kraken => "kraken",
            Self::Oracle => "oracle",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lead" => Some(Self::Lead),
            "worker" => Some(Self::Worker),
            "scout" => Some(Self::Scout),
            "architect" => Some(Self::Architect),
            "critic" => Some(Self::Critic),
            "kraken" => Some(Self::Kraken),
            "oracle" => Some(Self::Oracle),
            _ => None,
        }
    }

    /// System prefix prepended to every prompt composed for this role.
    pub fn system_prefix(&self) -> &'static str {
        match self {
            Self::Lead => {
                "You are the lead of a fleet of coding agents. You coordinate, \
                 delegate via the spawn queue, and keep the blackboard current."
            }
            Self::Worker => {
                "You are a worker in a fleet of coding agents. Work your assigned \
                 task in your own worktree and report progress via checkpoints."
            }
            Self::Scout => {
                "You are a scout. Explore the codebase, answer open questions, \
                 and post findings to the blackboard. Do not modify files."
            }
            Self::Architect => {
                "You are an architect. Produce designs and task decompositions \
                 for other workers; prefer blackboard directives over code edits."
            }
            Self::Critic => {
                "You are a critic. Review the work of other agents and post \
                 concrete, actionable findings."
            }
            Self::Kraken => {
                "You are a kraken: a long-running agent for large multi-part \
                 efforts. Checkpoint frequently so work survives restarts."
            }
            Self::Oracle => {
                "You are an oracle. Hold context and answer questions from other \
                 agents via mail; avoid making changes yourself."
            }
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a worker. Closed set.
///
/// `pending → ready → busy ↔ ready → stopping → stopped`, with terminal
/// `error` and `dismissed`. A worker whose restart budget is exhausted lands
/// in `error`; `dismissed` only ever results from an explicit dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Spawned, waiting for the ready marker
    Pending,
    /// Idle, available for work
    Ready,
    /// Executing a task
    Busy,
    /// Terminate sent, waiting for exit
    Stopping,
    /// Process exited
    Stopped,
    /// Stale heartbeat or restart budget exhausted; human-retryable
    Error,
    /// Explicitly dismissed
    Dismissed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "busy" => Some(Self::Busy),
            "stopping" => Some(Self::Stopping),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    /// States that survive an orchestrator restart and are re-spawned.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready | Self::Busy)
    }

    /// Whether a worker in this state counts against fleet capacity.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Dismissed)
    }

    /// Legal transitions of the lifecycle state machine.
    pub fn can_transition_to(&self, next: WorkerStatus) -> bool {
        use WorkerStatus::{Busy, Dismissed, Error, Pending, Ready, Stopped, Stopping};
        match (self, next) {
            (Pending, Ready) => true,
            (Ready, Busy) | (Busy, Ready) => true,
            (_, Error) => !matches!(self, Dismissed),
            (_, Stopping) => !matches!(self, Stopped | Dismissed),
            (Stopping, Stopped) => true,
            (Stopped | Error, Dismissed) => true,
            (Stopping, Dismissed) => true,
            // Restart path: an errored worker is re-spawned as pending.
            (Error, Pending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker record. Exclusively owned by the `WorkerManager`; its worktree is
/// exclusively owned by the worker while it lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Generated identity
    pub id: Uuid,
    /// Human-chosen handle, unique among non-dismissed workers
    pub handle: String,
    /// Role within the fleet
    pub role: WorkerRole,
    /// Lifecycle state
    pub status: WorkerStatus,
    /// Directory the subprocess runs in (the worktree path when one exists)
    pub working_dir: String,
    /// Initial prompt text, kept for recovery re-spawns
    pub initial_prompt: Option<String>,
    /// Isolated worktree path, when worktrees are enabled
    pub worktree_path: Option<String>,
    /// Dedicated branch, when worktrees are enabled
    pub branch: Option<String>,
    /// OS process id of the live subprocess
    pub pid: Option<u32>,
    /// Last heartbeat received
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Times this worker has been re-spawned after a crash
    pub restart_count: u32,
    /// Swarm membership
    pub swarm_id: Option<String>,
    /// Length of the spawn chain from a root request (root = 0)
    pub depth: u32,
    /// When spawned
    pub spawned_at: DateTime<Utc>,
    /// When dismissed, if ever
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Pattern a handle must match: `[A-Za-z0-9_-]{1,64}`.
pub fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= 64
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Worker {
    /// Create a new pending worker.
    pub fn new(handle: impl Into<String>, role: WorkerRole, working_dir: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle: handle.into(),
            role,
            status: WorkerStatus::Pending,
            working_dir: working_dir.into(),
            initial_prompt: None,
            worktree_path: None,
            branch: None,
            pid: None,
            last_heartbeat: None,
            restart_count: 0,
            swarm_id: None,
            depth: 0,
            spawned_at: Utc::now(),
            dismissed_at: None,
        }
    }

    /// Set swarm membership.
    pub fn with_swarm(mut self, swarm_id: impl Into<String>) -> Self {
        self.swarm_id = Some(swarm_id.into());
        self
    }

    /// Set spawn depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the initial prompt, kept for recovery.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }

    /// Short id prefix used in branch names and worktree paths.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// Whether the heartbeat is older than the given threshold.
    pub fn is_stale(&self, threshold_ms: u64, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            Some(hb) => {
                let age = now.signed_duration_since(hb);
                age.num_milliseconds() >= 0 && age.num_milliseconds() as u64 > threshold_ms
            }
            // Never heartbeated: measure from spawn time.
            None => {
                let age = now.signed_duration_since(self.spawned_at);
                age.num_milliseconds() >= 0 && age.num_milliseconds() as u64 > threshold_ms
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [
            WorkerRole::Lead,
            WorkerRole::Worker,
            WorkerRole::Scout,
            WorkerRole::Architect,
            WorkerRole::Critic,
            WorkerRole::Kraken,
            WorkerRole::Oracle,
        ] {
            assert_eq!(WorkerRole::parse_str(role.as_str()), Some(role));
        }
        assert_eq!(WorkerRole::parse_str("wizard"), None);
    }

    #[test]
    fn test_status_transitions() {
        assert!(WorkerStatus::Pending.can_transition_to(WorkerStatus::Ready));
        assert!(WorkerStatus::Ready.can_transition_to(WorkerStatus::Busy));
        assert!(WorkerStatus::Busy.can_transition_to(WorkerStatus::Ready));
        assert!(WorkerStatus::Busy.can_transition_to(WorkerStatus::Error));
        assert!(WorkerStatus::Error.can_transition_to(WorkerStatus::Pending));
        assert!(WorkerStatus::Stopping.can_transition_to(WorkerStatus::Stopped));
        assert!(!WorkerStatus::Pending.can_transition_to(WorkerStatus::Busy));
        assert!(!WorkerStatus::Dismissed.can_transition_to(WorkerStatus::Error));
    }

    #[test]
    fn test_recoverable_states() {
        assert!(WorkerStatus::Pending.is_recoverable());
        assert!(WorkerStatus::Ready.is_recoverable());
        assert!(WorkerStatus::Busy.is_recoverable());
        assert!(!WorkerStatus::Stopped.is_recoverable());
        assert!(!WorkerStatus::Dismissed.is_recoverable());
        assert!(!WorkerStatus::Error.is_recoverable());
    }

    #[test]
    fn test_handle_validation() {
        assert!(is_valid_handle("alice"));
        assert!(is_valid_handle("worker_1"));
        assert!(is_valid_handle("scout-7"));
        assert!(!is_valid_handle(""));
        assert!(!is_valid_handle("has space"));
        assert!(!is_valid_handle(&"x".repeat(65)));
    }

    #[test]
    fn test_staleness() {
        let mut worker = Worker::new("alice", WorkerRole::Worker, "/tmp");
        let now = Utc::now();
        worker.last_heartbeat = Some(now - chrono::Duration::seconds(120));
        assert!(worker.is_stale(60_000, now));
        assert!(!worker.is_stale(180_000, now));
    }

    #[test]
    fn test_short_id_is_stable_prefix() {
        let worker = Worker::new("alice", WorkerRole::Worker, "/tmp");
        let short = worker.short_id();
        assert_eq!(short.len(), 8);
        assert!(worker.id.simple().to_string().starts_with(&short));
    }
}
