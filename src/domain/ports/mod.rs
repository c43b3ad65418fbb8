//! Repository ports: async traits the adapters implement.

pub mod blackboard_repository;
pub mod checkpoint_repository;
pub mod mail_repository;
pub mod spawn_queue_repository;
pub mod storage;
pub mod swarm_repository;
pub mod task_repository;
pub mod worker_repository;

pub use blackboard_repository::BlackboardRepository;
pub use checkpoint_repository::{CheckpointFilter, CheckpointRepository};
pub use mail_repository::MailRepository;
pub use spawn_queue_repository::SpawnQueueRepository;
pub use storage::Storage;
pub use swarm_repository::SwarmRepository;
pub use task_repository::{TaskFilter, TaskRepository, WorkItemRepository};
pub use worker_repository::{WorkerFilter, WorkerRepository};
