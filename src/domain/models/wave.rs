//! Wave domain models.
//!
//! A wave is a named group of workers spawned together as one phase of a
//! plan; waves form a DAG through `after_waves`.

use serde::{Deserialize, Serialize};

use super::worker::WorkerRole;

/// One worker to spawn as part of a wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveWorkerSpec {
    pub handle: String,
    #[serde(default)]
    pub role: WorkerRole,
    /// Initial prompt text
    pub prompt: String,
    /// Success predicate over output lines; falls back to the configured
    /// default. Held as a pattern string so the predicate stays configurable.
    #[serde(default)]
    pub success_pattern: Option<String>,
    /// Override for worktree creation; `None` follows configuration
    #[serde(default)]
    pub worktree: Option<bool>,
    /// Command vector override; `None` uses the configured worker command
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

impl WaveWorkerSpec {
    pub fn new(handle: impl Into<String>, role: WorkerRole, prompt: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            role,
            prompt: prompt.into(),
            success_pattern: None,
            worktree: None,
            command: None,
        }
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_success_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.success_pattern = Some(pattern.into());
        self
    }

    pub fn without_worktree(mut self) -> Self {
        self.worktree = Some(false);
        self
    }
}

/// A named phase of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveSpec {
    pub name: String,
    pub workers: Vec<WaveWorkerSpec>,
    /// Waves that must complete before this one starts
    #[serde(default)]
    pub after_waves: Vec<String>,
    /// Keep executing the plan when a worker in this wave fails
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Per-wave timeout override, milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl WaveSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: Vec::new(),
            after_waves: Vec::new(),
            continue_on_failure: false,
            timeout_ms: None,
        }
    }

    pub fn with_worker(mut self, worker: WaveWorkerSpec) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn after(mut self, wave: impl Into<String>) -> Self {
        self.after_waves.push(wave.into());
        self
    }

    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }
}

/// Execution state of a wave or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a single worker in a wave finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub handle: String,
    pub success: bool,
    /// Matched pattern, exit code, or timeout note
    pub detail: String,
}

/// Aggregated result of one wave in one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveResult {
    pub wave: String,
    pub iteration: u32,
    pub status: WaveStatus,
    pub workers: Vec<WorkerOutcome>,
}

impl WaveResult {
    pub fn all_succeeded(&self) -> bool {
        self.workers.iter().all(|w| w.success)
    }
}

/// Point-in-time view of a plan's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStatus {
    pub status: WaveStatus,
    pub current_wave: Option<String>,
    pub completed_waves: usize,
    pub total_waves: usize,
    pub waves: Vec<WaveSnapshot>,
}

/// Per-wave entry in a plan status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveSnapshot {
    pub name: String,
    pub status: WaveStatus,
    pub worker_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_builder() {
        let wave = WaveSpec::new("design")
            .with_worker(WaveWorkerSpec::new("d1", WorkerRole::Architect, "design it"))
            .after("discover")
            .continue_on_failure();
        assert_eq!(wave.name, "design");
        assert_eq!(wave.workers.len(), 1);
        assert_eq!(wave.after_waves, vec!["discover".to_string()]);
        assert!(wave.continue_on_failure);
    }

    #[test]
    fn test_result_aggregation() {
        let result = WaveResult {
            wave: "w".into(),
            iteration: 1,
            status: WaveStatus::Completed,
            workers: vec![
                WorkerOutcome {
                    handle: "a".into(),
                    success: true,
                    detail: "matched DONE".into(),
                },
                WorkerOutcome {
                    handle: "b".into(),
                    success: false,
                    detail: "timeout".into(),
                },
            ],
        };
        assert!(!result.all_succeeded());
    }
}
