//! Mail service: directed messages and context handoffs.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    is_valid_handle, Handoff, MailMessage, OrchestratorEvent, MAX_HANDOFF_CONTEXT_BYTES,
};
use crate::domain::ports::Storage;

use super::event_bus::EventBus;

pub struct MailService {
    storage: Storage,
    event_bus: Arc<EventBus>,
}

impl MailService {
    pub fn new(storage: Storage, event_bus: Arc<EventBus>) -> Self {
        Self { storage, event_bus }
    }

    /// Send a message. Emits `mail:delivered` for in-process subscribers
    /// (e.g. a live worker's output-injection pipeline).
    #[instrument(skip(self, body, subject))]
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        body: impl Into<String>,
        subject: Option<String>,
    ) -> OrchestratorResult<i64> {
        if !is_valid_handle(to) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "invalid recipient handle '{to}'"
            )));
        }
        let message = MailMessage {
            id: 0,
            from_handle: from.to_string(),
            to_handle: to.to_string(),
            subject,
            body: body.into(),
            created_at: Utc::now(),
            read_at: None,
        };
        let id = self.storage.mail.send(&message).await?;
        self.event_bus.emit(OrchestratorEvent::MailDelivered {
            mail_id: id,
            to_handle: to.to_string(),
        });
        Ok(id)
    }

    pub async fn get_unread(&self, handle: &str) -> OrchestratorResult<Vec<MailMessage>> {
        self.storage.mail.get_unread(handle).await
    }

    pub async fn get_all(&self, handle: &str, limit: usize) -> OrchestratorResult<Vec<MailMessage>> {
        self.storage.mail.get_all(handle, limit).await
    }

    pub async fn mark_read(&self, id: i64) -> OrchestratorResult<bool> {
        self.storage.mail.mark_read(id).await
    }

    pub async fn mark_all_read(&self, handle: &str) -> OrchestratorResult<u64> {
        self.storage.mail.mark_all_read(handle).await
    }

    /// Create a handoff: an accept-once transfer of opaque context. The
    /// context blob is size-bounded; rejection is implicit (never accept).
    pub async fn create_handoff(
        &self,
        from: &str,
        to: &str,
        context: serde_json::Value,
    ) -> OrchestratorResult<i64> {
        let size = serde_json::to_string(&context)?.len();
        if size > MAX_HANDOFF_CONTEXT_BYTES {
            return Err(OrchestratorError::ValidationFailed(format!(
                "handoff context is {size} bytes, limit {MAX_HANDOFF_CONTEXT_BYTES}"
            )));
        }
        let handoff = Handoff {
            id: 0,
            from_handle: from.to_string(),
            to_handle: to.to_string(),
            context,
            created_at: Utc::now(),
            accepted_at: None,
        };
        self.storage.mail.create_handoff(&handoff).await
    }

    pub async fn get_pending_handoffs(&self, handle: &str) -> OrchestratorResult<Vec<Handoff>> {
        self.storage.mail.get_pending_handoffs(handle).await
    }

    /// Accept a handoff. Returns false when it was already accepted.
    pub async fn accept_handoff(&self, id: i64) -> OrchestratorResult<bool> {
        self.storage.mail.accept_handoff(id).await
    }
}
