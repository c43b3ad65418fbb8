//! Blackboard domain model.
//!
//! The blackboard is swarm-scoped durable pub/sub: workers post messages into
//! their swarm's namespace and read everything un-archived and non-expired
//! that is either untargeted or targeted at their handle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Well-known topic for fleet-wide announcements.
pub const TOPIC_BROADCAST: &str = "broadcast";
/// Well-known topic for alerts; posts default to a 24-hour expiry.
pub const TOPIC_ALERTS: &str = "alerts";
/// Prefix for per-worker status topics; posts default to a 1-hour expiry.
pub const TOPIC_STATUS_PREFIX: &str = "status/";

/// Default expiry applied to `status/<handle>` posts.
pub fn status_expiry() -> Duration {
    Duration::hours(1)
}

/// Default expiry applied to `alerts` posts.
pub fn alerts_expiry() -> Duration {
    Duration::hours(24)
}

/// Kind of a blackboard message. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Asking for something
    Request,
    /// Answering a request
    Response,
    /// Progress or situation report
    Status,
    /// An instruction from a lead
    Directive,
    /// Checkpoint announcement
    Checkpoint,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Status => "status",
            Self::Directive => "directive",
            Self::Checkpoint => "checkpoint",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "request" => Some(Self::Request),
            "response" => Some(Self::Response),
            "status" => Some(Self::Status),
            "directive" => Some(Self::Directive),
            "checkpoint" => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// Message priority. Ordering is used for read sorting: higher first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl MessagePriority {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            3 => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A durable blackboard message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackboardMessage {
    /// Monotonic id, total order within a swarm consistent with insertion
    pub id: i64,
    /// Swarm namespace
    pub swarm_id: String,
    /// Posting worker
    pub sender_handle: String,
    /// Recipient handle; `None` means broadcast within the swarm
    pub target_handle: Option<String>,
    /// Message kind
    pub message_type: MessageType,
    /// Priority
    pub priority: MessagePriority,
    /// Opaque payload
    pub payload: serde_json::Value,
    /// When posted
    pub created_at: DateTime<Utc>,
    /// When the message stops being visible
    pub expires_at: Option<DateTime<Utc>>,
    /// When archived, if ever
    pub archived_at: Option<DateTime<Utc>>,
    /// Handles that have marked this message read
    pub read_by: Vec<String>,
}

impl BlackboardMessage {
    /// Whether `reader` may see this message: it must be un-archived,
    /// non-expired, and either untargeted or addressed to the reader.
    /// Targeted messages stay visible to their sender for its own record.
    pub fn visible_to(&self, reader: &str, now: DateTime<Utc>) -> bool {
        if self.archived_at.is_some() {
            return false;
        }
        if let Some(expires) = self.expires_at {
            if expires <= now {
                return false;
            }
        }
        match &self.target_handle {
            None => true,
            Some(target) => target == reader || self.sender_handle == reader,
        }
    }

    pub fn is_read_by(&self, reader: &str) -> bool {
        self.read_by.iter().any(|h| h == reader)
    }
}

/// Filters for blackboard reads.
#[derive(Debug, Clone, Default)]
pub struct BlackboardFilter {
    pub message_type: Option<MessageType>,
    /// Minimum priority (inclusive)
    pub min_priority: Option<MessagePriority>,
    /// Only messages the reader has not marked read; requires `reader_handle`
    pub unread_only: bool,
    /// The handle doing the reading, for visibility and read bookkeeping
    pub reader_handle: Option<String>,
    /// Only messages created at or after this instant
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Default expiry for a payload posted to a well-known topic, if any.
/// Topics are conveyed in the payload's `topic` field by convention.
pub fn default_expiry_for_topic(topic: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if topic == TOPIC_ALERTS {
        Some(now + alerts_expiry())
    } else if topic.starts_with(TOPIC_STATUS_PREFIX) {
        Some(now + status_expiry())
    } else {
        None
    }
}
