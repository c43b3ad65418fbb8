//! Blackboard repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{BlackboardFilter, BlackboardMessage};

/// Repository interface for blackboard persistence.
#[async_trait]
pub trait BlackboardRepository: Send + Sync {
    /// Persist a message, returning it with its assigned monotonic id.
    async fn post(&self, message: &BlackboardMessage) -> OrchestratorResult<BlackboardMessage>;

    /// Read messages in a swarm, newest first within descending priority,
    /// honoring the visibility rule for `filter.reader_handle`.
    async fn read(
        &self,
        swarm_id: &str,
        filter: &BlackboardFilter,
    ) -> OrchestratorResult<Vec<BlackboardMessage>>;

    /// Messages with id greater than `last_seen_id`, oldest first, capped.
    async fn read_after(
        &self,
        swarm_id: &str,
        last_seen_id: i64,
        limit: usize,
    ) -> OrchestratorResult<Vec<BlackboardMessage>>;

    /// Record per-(message, reader) read marks.
    async fn mark_read(&self, ids: &[i64], reader: &str) -> OrchestratorResult<()>;

    async fn archive(&self, ids: &[i64]) -> OrchestratorResult<u64>;

    /// Archive messages in a swarm older than the given age. Returns count.
    async fn archive_old(&self, swarm_id: &str, max_age_ms: u64, now: DateTime<Utc>)
        -> OrchestratorResult<u64>;

    /// Number of visible messages the reader has not marked read.
    async fn unread_count(&self, swarm_id: &str, reader: &str) -> OrchestratorResult<u64>;
}
