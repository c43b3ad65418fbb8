//! Services: the orchestrator's behavior over the domain and ports.

pub mod blackboard_service;
pub mod checkpoint_service;
pub mod event_bus;
pub mod hook_pipeline;
pub mod mail_service;
pub mod process_supervisor;
pub mod prompt;
pub mod spawn_scheduler;
pub mod swarm_service;
pub mod wave_orchestrator;
pub mod worker_manager;
pub mod worktree_service;

pub use blackboard_service::{BlackboardService, PostOptions, Subscription};
pub use checkpoint_service::CheckpointService;
pub use event_bus::EventBus;
pub use hook_pipeline::{default_hooks, Hook, HookPipeline, RegexHook};
pub use mail_service::MailService;
pub use process_supervisor::{ProcessSupervisor, SpawnSpec};
pub use prompt::{compose, PromptParts};
pub use spawn_scheduler::{QueueSpawnOptions, SpawnScheduler};
pub use swarm_service::SwarmService;
pub use wave_orchestrator::{ExecuteOptions, SuccessCriteria, WaveOrchestrator};
pub use worker_manager::{SpawnOptions, WorkerManager};
pub use worktree_service::{WorktreeInfo, WorktreeService, WorktreeStatus};
