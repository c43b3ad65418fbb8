//! Domain models.

pub mod auth;
pub mod blackboard;
pub mod checkpoint;
pub mod config;
pub mod event;
pub mod hook;
pub mod mail;
pub mod spawn;
pub mod swarm;
pub mod task;
pub mod wave;
pub mod worker;

pub use auth::{AuthRole, Caller};
pub use blackboard::{
    default_expiry_for_topic, BlackboardFilter, BlackboardMessage, MessagePriority, MessageType,
    TOPIC_ALERTS, TOPIC_BROADCAST, TOPIC_STATUS_PREFIX,
};
pub use checkpoint::{Checkpoint, CheckpointBody, CheckpointFiles, CheckpointStatus};
pub use config::{
    DatabaseConfig, HeartbeatConfig, HooksConfig, LoggingConfig, OrchestratorConfig,
    SchedulerConfig, WaveConfig, WorkerProcessConfig, WorktreeConfig,
};
pub use event::{EventKind, OrchestratorEvent};
pub use hook::{
    HookContext, HookMode, HookSeverity, HookVerdict, OperationType, PipelineDecision,
};
pub use mail::{Handoff, MailMessage, MAX_HANDOFF_CONTEXT_BYTES};
pub use spawn::{SpawnQueueItem, SpawnStatus};
pub use swarm::Swarm;
pub use task::{Batch, Task, TaskStatus, WorkItem, WorkItemStatus};
pub use wave::{
    PlanStatus, WaveResult, WaveSnapshot, WaveSpec, WaveStatus, WaveWorkerSpec, WorkerOutcome,
};
pub use worker::{is_valid_handle, Worker, WorkerRole, WorkerStatus};
