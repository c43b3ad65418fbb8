//! Mail and handoff repository port.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Handoff, MailMessage};

/// Repository interface for mail and handoffs.
#[async_trait]
pub trait MailRepository: Send + Sync {
    /// Persist a message, returning its assigned id.
    async fn send(&self, message: &MailMessage) -> OrchestratorResult<i64>;

    async fn get(&self, id: i64) -> OrchestratorResult<Option<MailMessage>>;

    /// Unread mail for a handle, oldest first.
    async fn get_unread(&self, handle: &str) -> OrchestratorResult<Vec<MailMessage>>;

    /// All mail for a handle, newest first, capped.
    async fn get_all(&self, handle: &str, limit: usize) -> OrchestratorResult<Vec<MailMessage>>;

    /// Returns false when the message was already read.
    async fn mark_read(&self, id: i64) -> OrchestratorResult<bool>;

    /// Mark everything for a handle read; returns the number flipped.
    async fn mark_all_read(&self, handle: &str) -> OrchestratorResult<u64>;

    /// Persist a handoff, returning its assigned id.
    async fn create_handoff(&self, handoff: &Handoff) -> OrchestratorResult<i64>;

    async fn get_handoff(&self, id: i64) -> OrchestratorResult<Option<Handoff>>;

    /// Un-accepted handoffs addressed to a handle, oldest first.
    async fn get_pending_handoffs(&self, handle: &str) -> OrchestratorResult<Vec<Handoff>>;

    /// Record acceptance; returns false when already accepted.
    async fn accept_handoff(&self, id: i64) -> OrchestratorResult<bool>;
}
