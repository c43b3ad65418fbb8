//! Blackboard service.
//!
//! Swarm-scoped pub/sub over durable storage. Reads honor the visibility
//! rule (untargeted, targeted-at-reader, or sent-by-reader), ordering is
//! priority descending then newest first, and subscription is a bounded
//! catch-up read against monotonically increasing ids.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, instrument};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    default_expiry_for_topic, BlackboardFilter, BlackboardMessage, Caller, MessagePriority,
    MessageType, OrchestratorEvent,
};
use crate::domain::ports::Storage;

use super::event_bus::EventBus;

/// Options for a post.
#[derive(Debug, Clone, Default)]
pub struct PostOptions {
    pub target_handle: Option<String>,
    pub priority: Option<MessagePriority>,
    pub expires_in_ms: Option<u64>,
}

/// A page of catch-up messages plus the new cursor.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub messages: Vec<BlackboardMessage>,
    pub new_last_seen_id: i64,
}

const SUBSCRIBE_PAGE_SIZE: usize = 100;

pub struct BlackboardService {
    storage: Storage,
    event_bus: Arc<EventBus>,
}

impl BlackboardService {
    pub fn new(storage: Storage, event_bus: Arc<EventBus>) -> Self {
        Self { storage, event_bus }
    }

    /// Post a message into a swarm.
    #[instrument(skip(self, payload, options))]
    pub async fn post(
        &self,
        swarm_id: &str,
        sender: &str,
        message_type: MessageType,
        payload: serde_json::Value,
        options: PostOptions,
    ) -> OrchestratorResult<BlackboardMessage> {
        let now = Utc::now();
        let expires_at = options
            .expires_in_ms
            .map(|ms| now + Duration::milliseconds(ms as i64));

        let message = BlackboardMessage {
            id: 0,
            swarm_id: swarm_id.to_string(),
            sender_handle: sender.to_string(),
            target_handle: options.target_handle,
            message_type,
            priority: options.priority.unwrap_or_default(),
            payload,
            created_at: now,
            expires_at,
            archived_at: None,
            read_by: Vec::new(),
        };

        let posted = self.storage.blackboard.post(&message).await?;
        self.event_bus.emit(OrchestratorEvent::BlackboardPosted {
            message_id: posted.id,
            swarm_id: posted.swarm_id.clone(),
            sender: posted.sender_handle.clone(),
        });
        Ok(posted)
    }

    /// Post to a well-known topic. The topic rides in the payload envelope
    /// and carries its default expiry (`status/*` one hour, `alerts` a day).
    pub async fn post_topic(
        &self,
        swarm_id: &str,
        sender: &str,
        topic: &str,
        message_type: MessageType,
        body: serde_json::Value,
        mut options: PostOptions,
    ) -> OrchestratorResult<BlackboardMessage> {
        let now = Utc::now();
        if options.expires_in_ms.is_none() {
            if let Some(expiry) = default_expiry_for_topic(topic, now) {
                options.expires_in_ms =
                    Some((expiry - now).num_milliseconds().max(0) as u64);
            }
        }
        let payload = serde_json::json!({ "topic": topic, "body": body });
        self.post(swarm_id, sender, message_type, payload, options)
            .await
    }

    /// Read messages, priority descending then newest first.
    pub async fn read(
        &self,
        swarm_id: &str,
        filter: BlackboardFilter,
    ) -> OrchestratorResult<Vec<BlackboardMessage>> {
        self.storage.blackboard.read(swarm_id, &filter).await
    }

    /// Bounded catch-up over ids greater than `last_seen_id`. Callers poll.
    pub async fn subscribe(
        &self,
        swarm_id: &str,
        last_seen_id: i64,
    ) -> OrchestratorResult<Subscription> {
        let messages = self
            .storage
            .blackboard
            .read_after(swarm_id, last_seen_id, SUBSCRIBE_PAGE_SIZE)
            .await?;
        let new_last_seen_id = messages.last().map_or(last_seen_id, |m| m.id);
        Ok(Subscription {
            messages,
            new_last_seen_id,
        })
    }

    pub async fn mark_read(&self, ids: &[i64], reader: &str) -> OrchestratorResult<()> {
        self.storage.blackboard.mark_read(ids, reader).await
    }

    pub async fn archive(&self, ids: &[i64]) -> OrchestratorResult<u64> {
        self.storage.blackboard.archive(ids).await
    }

    /// Archive everything in a swarm older than `max_age_ms`.
    pub async fn archive_old(&self, swarm_id: &str, max_age_ms: u64) -> OrchestratorResult<u64> {
        let count = self
            .storage
            .blackboard
            .archive_old(swarm_id, max_age_ms, Utc::now())
            .await?;
        debug!(swarm_id, count, "archived old blackboard messages");
        Ok(count)
    }

    pub async fn unread_count(&self, swarm_id: &str, reader: &str) -> OrchestratorResult<u64> {
        self.storage.blackboard.unread_count(swarm_id, reader).await
    }

    // Caller-facing variants. The transport adapter authenticates; the core
    // enforces within-swarm access here.

    pub async fn post_as(
        &self,
        caller: &Caller,
        swarm_id: &str,
        message_type: MessageType,
        payload: serde_json::Value,
        options: PostOptions,
    ) -> OrchestratorResult<BlackboardMessage> {
        self.ensure_swarm_access(caller, swarm_id)?;
        self.post(swarm_id, &caller.handle, message_type, payload, options)
            .await
    }

    pub async fn read_as(
        &self,
        caller: &Caller,
        swarm_id: &str,
        mut filter: BlackboardFilter,
    ) -> OrchestratorResult<Vec<BlackboardMessage>> {
        self.ensure_swarm_access(caller, swarm_id)?;
        filter.reader_handle.get_or_insert_with(|| caller.handle.clone());
        self.read(swarm_id, filter).await
    }

    fn ensure_swarm_access(&self, caller: &Caller, swarm_id: &str) -> OrchestratorResult<()> {
        if caller.can_access_swarm(swarm_id) {
            Ok(())
        } else {
            Err(OrchestratorError::AccessDenied {
                handle: caller.handle.clone(),
                reason: format!("no access to swarm {swarm_id}"),
            })
        }
    }
}
