//! Task, work-item, and batch domain models.
//!
//! Tasks are coarse durable records owned by handles. Work items are finer
//! units grouped into batches; dispatching a batch moves every pending item
//! to in-progress in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Resolved,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// Status of a work item. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A durable task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub subject: String,
    pub status: TaskStatus,
    /// Owning handle, if assigned
    pub owner: Option<String>,
    /// Task ids that must resolve before this one can proceed
    pub blocked_by: Vec<Uuid>,
    /// Team scope
    pub team: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            status: TaskStatus::Open,
            owner: None,
            blocked_by: Vec::new(),
            team: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A finer unit of work, optionally grouped into a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub batch_id: Option<Uuid>,
    pub subject: String,
    pub status: WorkItemStatus,
    pub owner: Option<String>,
    pub blocked_by: Vec<Uuid>,
    pub team: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            batch_id: None,
            subject: subject.into(),
            status: WorkItemStatus::Pending,
            owner: None,
            blocked_by: Vec::new(),
            team: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_batch(mut self, batch_id: Uuid) -> Self {
        self.batch_id = Some(batch_id);
        self
    }
}

/// A named group of work items dispatched together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Set when the batch was dispatched (pending items moved to in-progress)
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            dispatched_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for s in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Resolved,
            TaskStatus::Blocked,
        ] {
            assert_eq!(TaskStatus::parse_str(s.as_str()), Some(s));
        }
        for s in [
            WorkItemStatus::Pending,
            WorkItemStatus::InProgress,
            WorkItemStatus::Completed,
            WorkItemStatus::Blocked,
            WorkItemStatus::Cancelled,
        ] {
            assert_eq!(WorkItemStatus::parse_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_work_item_batching() {
        let batch = Batch::new("sprint-1");
        let item = WorkItem::new("wire up parser").in_batch(batch.id);
        assert_eq!(item.batch_id, Some(batch.id));
        assert_eq!(item.status, WorkItemStatus::Pending);
    }
}
