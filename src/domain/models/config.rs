//! Orchestrator configuration model.
//!
//! Loaded hierarchically (defaults, project YAML, local overrides, FLOTILLA_*
//! environment variables) by `infrastructure::config::ConfigLoader`.

use serde::{Deserialize, Serialize};

use super::hook::HookMode;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard cap on non-dismissed workers
    pub max_workers: usize,
    /// Maximum spawn-chain depth
    pub max_depth: u32,
    /// Restart budget before a worker lands in error
    pub max_restarts: u32,
    pub heartbeat: HeartbeatConfig,
    pub worktree: WorktreeConfig,
    pub worker: WorkerProcessConfig,
    pub hooks: HooksConfig,
    pub scheduler: SchedulerConfig,
    pub wave: WaveConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 100,
            max_depth: 3,
            max_restarts: 3,
            heartbeat: HeartbeatConfig::default(),
            worktree: WorktreeConfig::default(),
            worker: WorkerProcessConfig::default(),
            hooks: HooksConfig::default(),
            scheduler: SchedulerConfig::default(),
            wave: WaveConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Heartbeat sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How often the sweep runs, milliseconds
    pub interval_ms: u64,
    /// Heartbeat age past which a worker is stale, milliseconds
    pub stale_threshold_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            stale_threshold_ms: 120_000,
        }
    }
}

/// Worktree isolation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreeConfig {
    pub enabled: bool,
    /// Directory worktrees are created under
    pub base_dir: String,
    /// Branch name prefix; the short worker id is appended
    pub branch_prefix: String,
    /// Branch worktrees are created from
    pub default_base_branch: String,
    /// Remote used for fetch/push
    pub remote: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: ".flotilla/worktrees".into(),
            branch_prefix: "flotilla/".into(),
            default_base_branch: "main".into(),
            remote: "origin".into(),
        }
    }
}

/// Worker subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerProcessConfig {
    /// Command vector the subprocess is launched with
    pub command: Vec<String>,
    /// Output line marking the worker ready for work
    pub ready_pattern: String,
    /// Default success predicate for wave workers
    pub success_pattern: String,
    /// Prompt shape that, together with silence, means idle
    pub idle_prompt_pattern: String,
    /// Output must be silent this long before idle is considered, ms
    pub idle_stable_ms: u64,
    /// Grace between soft and hard terminate signals, ms
    pub terminate_grace_ms: u64,
}

impl Default for WorkerProcessConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".into()],
            ready_pattern: "READY".into(),
            success_pattern: "DONE".into(),
            idle_prompt_pattern: r"^(>|\$)\s*$".into(),
            idle_stable_ms: 5_000,
            terminate_grace_ms: 5_000,
        }
    }
}

/// Hook pipeline settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub mode: HookMode,
    /// Disable the seeded safety rules (tests only)
    pub seed_defaults: Option<bool>,
}

/// Spawn-queue scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Evaluation interval, milliseconds
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_ms: 2_000 }
    }
}

/// Wave execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Default per-wave timeout, milliseconds
    pub timeout_ms: u64,
    /// Poll interval while waiting on wave workers, milliseconds
    pub poll_ms: u64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            poll_ms: 250,
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend selector; only `sqlite` ships in-tree
    pub backend: String,
    /// SQLite database path
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            path: ".flotilla/flotilla.db".into(),
            max_connections: 10,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
    /// Optional directory for a rolling file appender
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            dir: None,
        }
    }
}
