//! Checkpoint domain model.
//!
//! A checkpoint is a structured snapshot of a worker's state, sent to a
//! recipient who accepts or rejects it exactly once. The latest checkpoint
//! for a handle feeds the recovery prompt after a crash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review state of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Accepted,
    Rejected,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// The structured body of a checkpoint.
///
/// `goal` is required; everything else may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointBody {
    /// What the worker is trying to achieve. Required.
    pub goal: String,
    /// What it is doing right now
    #[serde(default)]
    pub now: String,
    /// Accomplishments this session
    #[serde(default)]
    pub done_this_session: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// Approaches that worked
    #[serde(default)]
    pub worked: Vec<String>,
    /// Approaches that failed
    #[serde(default)]
    pub failed: Vec<String>,
    /// Next actions
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default)]
    pub files: CheckpointFiles,
}

/// Files touched during the checkpointed session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointFiles {
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

/// A checkpoint row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Monotonic id; "latest" for a handle is the highest id addressed to it
    pub id: i64,
    pub from_handle: String,
    pub to_handle: String,
    /// Role of the sender at checkpoint time, for filtering
    pub role: Option<String>,
    pub body: CheckpointBody,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl CheckpointBody {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.goal.trim().is_empty() {
            return Err("Checkpoint goal cannot be empty".to_string());
        }
        Ok(())
    }

    /// Render for prompt injection: one compact block a worker can resume from.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Goal: {}\n", self.goal));
        if !self.now.is_empty() {
            out.push_str(&format!("Currently: {}\n", self.now));
        }
        render_list(&mut out, "Done this session", &self.done_this_session);
        render_list(&mut out, "Blockers", &self.blockers);
        render_list(&mut out, "Open questions", &self.questions);
        render_list(&mut out, "What worked", &self.worked);
        render_list(&mut out, "What failed", &self.failed);
        render_list(&mut out, "Next", &self.next);
        render_list(&mut out, "Files created", &self.files.created);
        render_list(&mut out, "Files modified", &self.files.modified);
        out
    }
}

fn render_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(title);
    out.push_str(":\n");
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_required() {
        assert!(CheckpointBody::new("implement X").validate().is_ok());
        assert!(CheckpointBody::new("  ").validate().is_err());
        assert!(CheckpointBody::default().validate().is_err());
    }

    #[test]
    fn test_render_includes_sections() {
        let mut body = CheckpointBody::new("implement X");
        body.next = vec!["write tests".into()];
        body.blockers = vec!["flaky CI".into()];
        let rendered = body.render();
        assert!(rendered.contains("Goal: implement X"));
        assert!(rendered.contains("write tests"));
        assert!(rendered.contains("Blockers"));
        // Empty sections are omitted entirely.
        assert!(!rendered.contains("What worked"));
    }
}
