//! Swarm domain model.
//!
//! A swarm is a logical grouping of workers sharing a blackboard namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A logical grouping of workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Maximum member workers
    pub max_agents: u32,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When deleted, if ever
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Swarm {
    pub fn new(name: impl Into<String>, max_agents: u32) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            max_agents,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}
