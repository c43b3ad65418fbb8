//! Mail and handoff domain models.
//!
//! Mail is directed worker-to-worker messaging; a handoff is a directed,
//! accept-once transfer of opaque context. Neither is marked read/accepted by
//! prompt injection, which keeps delivery at-least-once across crashes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on a handoff context blob, serialized.
pub const MAX_HANDOFF_CONTEXT_BYTES: usize = 64 * 1024;

/// A directed message between workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Monotonic id; total order per recipient
    pub id: i64,
    pub from_handle: String,
    pub to_handle: String,
    pub subject: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Set by an explicit mark-read, never by injection
    pub read_at: Option<DateTime<Utc>>,
}

impl MailMessage {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// A directed context transfer with an explicit accept step.
///
/// Rejection is implicit: a handoff that is never accepted stays pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: i64,
    pub from_handle: String,
    pub to_handle: String,
    /// Opaque structured context, size-bounded
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Handoff {
    pub fn is_pending(&self) -> bool {
        self.accepted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_until_marked() {
        let msg = MailMessage {
            id: 1,
            from_handle: "lead".into(),
            to_handle: "alice".into(),
            subject: None,
            body: "check logs".into(),
            created_at: Utc::now(),
            read_at: None,
        };
        assert!(msg.is_unread());
    }

    #[test]
    fn test_handoff_pending_until_accepted() {
        let mut handoff = Handoff {
            id: 1,
            from_handle: "lead".into(),
            to_handle: "alice".into(),
            context: serde_json::json!({"notes": "continue here"}),
            created_at: Utc::now(),
            accepted_at: None,
        };
        assert!(handoff.is_pending());
        handoff.accepted_at = Some(Utc::now());
        assert!(!handoff.is_pending());
    }
}
