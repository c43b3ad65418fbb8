//! Swarm service.

use tracing::instrument;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::Swarm;
use crate::domain::ports::{Storage, WorkerFilter};

pub struct SwarmService {
    storage: Storage,
}

impl SwarmService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn create(&self, name: &str, max_agents: u32) -> OrchestratorResult<Swarm> {
        let swarm = Swarm::new(name, max_agents);
        self.storage.swarms.create(&swarm).await?;
        Ok(swarm)
    }

    pub async fn get(&self, id: &str) -> OrchestratorResult<Option<Swarm>> {
        self.storage.swarms.get(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> OrchestratorResult<Option<Swarm>> {
        self.storage.swarms.get_by_name(name).await
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<Swarm>> {
        self.storage.swarms.list().await
    }

    /// Delete a swarm. Refused while member workers are live, unless forced.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, force: bool) -> OrchestratorResult<()> {
        if !force {
            let members = self
                .storage
                .workers
                .list(WorkerFilter {
                    swarm_id: Some(id.to_string()),
                    ..WorkerFilter::default()
                })
                .await?;
            if !members.is_empty() {
                return Err(OrchestratorError::InvalidState {
                    entity: "swarm",
                    id: id.to_string(),
                    reason: format!("{} live workers are still members", members.len()),
                });
            }
        }
        self.storage.swarms.delete(id).await
    }
}
