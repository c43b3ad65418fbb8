//! Spawn-queue scheduler.
//!
//! Workers request new workers through a durable, depth-bounded dependency
//! DAG. The scheduler evaluates the queue periodically and on every status
//! change: a pending item whose dependencies have all spawned is either
//! approved (emitting `spawn:ready`) or rejected when policy vetoes it.
//! Bounded parallelism holds across the fleet: live workers plus approved
//! items never exceed the worker cap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    HookContext, OrchestratorEvent, SpawnQueueItem, SpawnStatus, WorkerRole,
};
use crate::domain::ports::Storage;

use super::event_bus::EventBus;
use super::hook_pipeline::HookPipeline;

/// Options accompanying a spawn request.
#[derive(Debug, Clone, Default)]
pub struct QueueSpawnOptions {
    pub priority: u8,
    pub depends_on: Vec<Uuid>,
    pub swarm_id: Option<String>,
    pub context: Option<serde_json::Value>,
}

pub struct SpawnScheduler {
    storage: Storage,
    event_bus: Arc<EventBus>,
    hooks: Arc<HookPipeline>,
    max_depth: u32,
    max_workers: usize,
    tick: Duration,
}

impl SpawnScheduler {
    pub fn new(
        storage: Storage,
        event_bus: Arc<EventBus>,
        hooks: Arc<HookPipeline>,
        max_depth: u32,
        max_workers: usize,
        tick_ms: u64,
    ) -> Self {
        Self {
            storage,
            event_bus,
            hooks,
            max_depth,
            max_workers,
            tick: Duration::from_millis(tick_ms),
        }
    }

    /// Queue a spawn request. Fails with `DepthExceeded` past the chain
    /// limit and `DependencyCycle` when the dependencies would form a cycle.
    #[instrument(skip(self, task, options))]
    pub async fn queue_spawn(
        &self,
        requester: &str,
        target_role: WorkerRole,
        depth: u32,
        task: &str,
        options: QueueSpawnOptions,
    ) -> OrchestratorResult<Uuid> {
        if depth > self.max_depth {
            return Err(OrchestratorError::DepthExceeded {
                depth,
                max: self.max_depth,
            });
        }

        let existing = self.storage.spawn_queue.list_all().await?;
        let known: HashSet<Uuid> = existing.iter().map(|i| i.id).collect();
        for dep in &options.depends_on {
            if !known.contains(dep) {
                return Err(OrchestratorError::NotFound {
                    entity: "spawn queue item",
                    id: dep.to_string(),
                });
            }
        }

        let mut item = SpawnQueueItem::new(requester, target_role, depth, task)
            .with_priority(options.priority)
            .with_depends_on(options.depends_on);
        item.swarm_id = options.swarm_id;
        item.context = options.context;

        if would_cycle(&existing, &item) {
            return Err(OrchestratorError::DependencyCycle(item.id.to_string()));
        }

        self.storage.spawn_queue.insert(&item).await?;
        self.event_bus.emit(OrchestratorEvent::SpawnQueued {
            item_id: item.id,
            requester: requester.to_string(),
        });

        self.evaluate().await?;
        Ok(item.id)
    }

    /// Add a dependency edge between existing items. Rejected when the edge
    /// would form a cycle.
    pub async fn add_dependency(
        &self,
        item_id: Uuid,
        depends_on: Uuid,
    ) -> OrchestratorResult<()> {
        let mut items = self.storage.spawn_queue.list_all().await?;
        let item = items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(OrchestratorError::NotFound {
                entity: "spawn queue item",
                id: item_id.to_string(),
            })?;
        item.depends_on.push(depends_on);

        if items_have_cycle(&items) {
            return Err(OrchestratorError::DependencyCycle(item_id.to_string()));
        }
        self.storage
            .spawn_queue
            .add_dependency(item_id, depends_on)
            .await?;
        self.evaluate().await
    }

    /// Evaluate every pending item: approve when all dependencies have
    /// spawned and a slot is open, reject when policy vetoes.
    pub async fn evaluate(&self) -> OrchestratorResult<()> {
        let items = self.storage.spawn_queue.list_all().await?;
        let spawned: HashSet<Uuid> = items
            .iter()
            .filter(|i| i.status == SpawnStatus::Spawned)
            .map(|i| i.id)
            .collect();

        let live_workers = self.storage.workers.count_live().await?;
        let mut approved_count = items
            .iter()
            .filter(|i| i.status == SpawnStatus::Approved)
            .count();

        // Priority descending, then insertion order (list_all is insertion
        // ordered).
        let mut pending: Vec<&SpawnQueueItem> = items
            .iter()
            .filter(|i| i.status == SpawnStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority));

        for item in pending {
            if !item.depends_on.iter().all(|dep| spawned.contains(dep)) {
                continue;
            }

            // Policy check over the task text before anything is launched.
            let context =
                HookContext::command(item.task.clone()).from_worker(item.requester_handle.clone());
            let decision = self.hooks.check(&context);
            if !decision.allowed {
                let reason = decision.reason.unwrap_or_default();
                warn!(item_id = %item.id, %reason, "spawn request vetoed");
                self.storage
                    .spawn_queue
                    .update_status(item.id, SpawnStatus::Rejected)
                    .await?;
                self.event_bus.emit(OrchestratorEvent::SpawnRejected {
                    item_id: item.id,
                    reason,
                });
                continue;
            }

            if live_workers + approved_count >= self.max_workers {
                debug!(item_id = %item.id, "no open slot, leaving pending");
                continue;
            }

            self.storage
                .spawn_queue
                .update_status(item.id, SpawnStatus::Approved)
                .await?;
            approved_count += 1;
            info!(item_id = %item.id, "spawn request approved");
            self.event_bus
                .emit(OrchestratorEvent::SpawnReady { item_id: item.id });
        }

        Ok(())
    }

    /// Highest-priority approved item, for a consumer about to launch it.
    pub async fn next_ready(&self) -> OrchestratorResult<Option<SpawnQueueItem>> {
        let approved = self
            .storage
            .spawn_queue
            .list_by_status(SpawnStatus::Approved)
            .await?;
        Ok(approved.into_iter().next())
    }

    /// Record the worker an item produced; downstream items may unblock.
    pub async fn mark_spawned(&self, id: Uuid, worker_id: Uuid) -> OrchestratorResult<()> {
        self.storage.spawn_queue.mark_spawned(id, worker_id).await?;
        self.evaluate().await
    }

    pub async fn get(&self, id: Uuid) -> OrchestratorResult<Option<SpawnQueueItem>> {
        self.storage.spawn_queue.get(id).await
    }

    pub async fn list(&self, status: Option<SpawnStatus>) -> OrchestratorResult<Vec<SpawnQueueItem>> {
        match status {
            Some(status) => self.storage.spawn_queue.list_by_status(status).await,
            None => self.storage.spawn_queue.list_all().await,
        }
    }

    /// Reject everything not yet terminal. Used on orchestrator cancel.
    pub async fn cancel_pending(&self) -> OrchestratorResult<u64> {
        let items = self.storage.spawn_queue.list_all().await?;
        let mut rejected = 0;
        for item in items {
            if item.status.is_terminal() {
                continue;
            }
            self.storage
                .spawn_queue
                .update_status(item.id, SpawnStatus::Rejected)
                .await?;
            self.event_bus.emit(OrchestratorEvent::SpawnRejected {
                item_id: item.id,
                reason: "orchestrator cancelled".to_string(),
            });
            rejected += 1;
        }
        Ok(rejected)
    }

    /// Periodic evaluation loop. Runs until cancelled, then rejects what is
    /// left in the queue.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.evaluate().await {
                        warn!(error = %e, "spawn queue evaluation failed");
                    }
                }
                () = cancel.cancelled() => {
                    if let Err(e) = self.cancel_pending().await {
                        warn!(error = %e, "failed to reject pending spawn items");
                    }
                    return;
                }
            }
        }
    }
}

/// Would inserting `candidate` (with its dependency edges) close a cycle?
fn would_cycle(existing: &[SpawnQueueItem], candidate: &SpawnQueueItem) -> bool {
    let mut items: Vec<SpawnQueueItem> = existing.to_vec();
    items.push(candidate.clone());
    items_have_cycle(&items)
}

/// Simple DFS over the dependency edges of all queue items.
fn items_have_cycle(items: &[SpawnQueueItem]) -> bool {
    let deps: HashMap<Uuid, &[Uuid]> = items
        .iter()
        .map(|i| (i.id, i.depends_on.as_slice()))
        .collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }

    fn visit(node: Uuid, deps: &HashMap<Uuid, &[Uuid]>, marks: &mut HashMap<Uuid, Mark>) -> bool {
        match marks.get(&node) {
            Some(Mark::Done) => return false,
            Some(Mark::InProgress) => return true,
            None => {}
        }
        marks.insert(node, Mark::InProgress);
        for dep in deps.get(&node).copied().unwrap_or_default() {
            if visit(*dep, deps, marks) {
                return true;
            }
        }
        marks.insert(node, Mark::Done);
        false
    }

    let mut marks = HashMap::new();
    items.iter().any(|item| visit(item.id, &deps, &mut marks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(deps: Vec<Uuid>) -> SpawnQueueItem {
        SpawnQueueItem::new("lead", WorkerRole::Worker, 1, "task").with_depends_on(deps)
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let a = item(vec![]);
        let b = item(vec![a.id]);
        let c = item(vec![b.id]);
        assert!(!items_have_cycle(&[a, b, c]));
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let mut a = item(vec![]);
        let b = item(vec![a.id]);
        a.depends_on = vec![b.id];
        assert!(items_have_cycle(&[a, b]));
    }

    #[test]
    fn test_self_cycle_detected() {
        let mut a = item(vec![]);
        a.depends_on = vec![a.id];
        assert!(items_have_cycle(&[a]));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let root = item(vec![]);
        let left = item(vec![root.id]);
        let right = item(vec![root.id]);
        let join = item(vec![left.id, right.id]);
        assert!(!items_have_cycle(&[root, left, right, join]));
    }
}
