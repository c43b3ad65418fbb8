//! Swarm repository port.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::Swarm;

/// Repository interface for swarm persistence.
#[async_trait]
pub trait SwarmRepository: Send + Sync {
    async fn create(&self, swarm: &Swarm) -> OrchestratorResult<()>;

    async fn get(&self, id: &str) -> OrchestratorResult<Option<Swarm>>;

    async fn get_by_name(&self, name: &str) -> OrchestratorResult<Option<Swarm>>;

    async fn list(&self) -> OrchestratorResult<Vec<Swarm>>;

    /// Soft-delete. Callers enforce the no-live-members guard unless forced.
    async fn delete(&self, id: &str) -> OrchestratorResult<()>;
}
