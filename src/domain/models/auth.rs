//! Caller identity for core-enforced access checks.
//!
//! Authentication itself happens in the transport adapter; the core receives
//! a reduced claim: a handle, a coarse role, and the swarms the caller may
//! touch.

use serde::{Deserialize, Serialize};

/// Coarse authorization role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthRole {
    TeamLead,
    Worker,
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub handle: String,
    pub role: AuthRole,
    /// Swarms this caller may access; empty plus `TeamLead` means all
    pub swarms: Vec<String>,
}

impl Caller {
    pub fn lead(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            role: AuthRole::TeamLead,
            swarms: Vec::new(),
        }
    }

    pub fn worker(handle: impl Into<String>, swarm: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            role: AuthRole::Worker,
            swarms: vec![swarm.into()],
        }
    }

    pub fn is_lead(&self) -> bool {
        self.role == AuthRole::TeamLead
    }

    /// Whether this caller may touch the given swarm's blackboard.
    pub fn can_access_swarm(&self, swarm_id: &str) -> bool {
        if self.is_lead() && self.swarms.is_empty() {
            return true;
        }
        self.swarms.iter().any(|s| s == swarm_id)
    }

    /// Whether this caller may create a checkpoint on behalf of `from`.
    pub fn can_checkpoint_as(&self, from_handle: &str) -> bool {
        self.is_lead() || self.handle == from_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swarm_access() {
        let worker = Caller::worker("alice", "s1");
        assert!(worker.can_access_swarm("s1"));
        assert!(!worker.can_access_swarm("s2"));

        let lead = Caller::lead("boss");
        assert!(lead.can_access_swarm("s1"));
        assert!(lead.can_access_swarm("s2"));
    }

    #[test]
    fn test_checkpoint_self_only_except_leads() {
        let worker = Caller::worker("alice", "s1");
        assert!(worker.can_checkpoint_as("alice"));
        assert!(!worker.can_checkpoint_as("bob"));
        assert!(Caller::lead("boss").can_checkpoint_as("bob"));
    }
}
