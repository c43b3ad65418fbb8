//! The storage capability bundle.
//!
//! Storage is polymorphic over the capability set; components receive this
//! struct and call through trait objects, so alternate backends (external
//! relational, cloud key-value) slot in without touching the services.

use std::sync::Arc;

use super::blackboard_repository::BlackboardRepository;
use super::checkpoint_repository::CheckpointRepository;
use super::mail_repository::MailRepository;
use super::spawn_queue_repository::SpawnQueueRepository;
use super::swarm_repository::SwarmRepository;
use super::task_repository::{TaskRepository, WorkItemRepository};
use super::worker_repository::WorkerRepository;

/// One handle per persistence capability.
#[derive(Clone)]
pub struct Storage {
    pub workers: Arc<dyn WorkerRepository>,
    pub swarms: Arc<dyn SwarmRepository>,
    pub blackboard: Arc<dyn BlackboardRepository>,
    pub mail: Arc<dyn MailRepository>,
    pub checkpoints: Arc<dyn CheckpointRepository>,
    pub spawn_queue: Arc<dyn SpawnQueueRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub work_items: Arc<dyn WorkItemRepository>,
}
