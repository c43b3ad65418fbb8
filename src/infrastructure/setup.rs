//! Orchestrator assembly.
//!
//! One explicit value constructed at startup and passed by reference; there
//! is no module-scope default instance. Wires the pool, storage capability
//! set, event bus, hook pipeline, and services together, and runs the
//! long-lived loops (recovery, heartbeat sweep, spawn-queue scheduling and
//! consumption) under one cancellation token.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::sqlite::{storage_from_pool, DatabaseConnection};
use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{OrchestratorConfig, SpawnQueueItem};
use crate::domain::ports::Storage;
use crate::services::{
    BlackboardService, CheckpointService, EventBus, HookPipeline, MailService,
    ProcessSupervisor, SpawnOptions, SpawnScheduler, SwarmService, WaveOrchestrator,
    WorkerManager, WorktreeService,
};

pub struct Orchestrator {
    pub config: OrchestratorConfig,
    pub db: DatabaseConnection,
    pub storage: Storage,
    pub event_bus: Arc<EventBus>,
    pub hooks: Arc<HookPipeline>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub worktrees: Arc<WorktreeService>,
    pub blackboard: Arc<BlackboardService>,
    pub mail: Arc<MailService>,
    pub checkpoints: Arc<CheckpointService>,
    pub swarms: Arc<SwarmService>,
    pub scheduler: Arc<SpawnScheduler>,
    pub workers: Arc<WorkerManager>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Build against the configured database path.
    pub async fn build(
        config: OrchestratorConfig,
        repo_root: impl Into<PathBuf>,
    ) -> OrchestratorResult<Self> {
        let path = PathBuf::from(&config.database.path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let url = format!("sqlite:{}", config.database.path);
        Self::build_with_url(config, &url, repo_root).await
    }

    /// Build against an explicit database URL (tests use `sqlite::memory:`).
    pub async fn build_with_url(
        config: OrchestratorConfig,
        database_url: &str,
        repo_root: impl Into<PathBuf>,
    ) -> OrchestratorResult<Self> {
        let repo_root = repo_root.into();
        let db = DatabaseConnection::new(database_url, config.database.max_connections).await?;
        db.migrate().await?;
        let storage = storage_from_pool(db.pool());

        let event_bus = Arc::new(EventBus::new());
        let hooks = if config.hooks.seed_defaults.unwrap_or(true) {
            Arc::new(HookPipeline::with_default_hooks(
                config.hooks.mode,
                Arc::clone(&event_bus),
            ))
        } else {
            Arc::new(HookPipeline::new(config.hooks.mode, Arc::clone(&event_bus)))
        };
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::clone(&event_bus),
            config.worker.clone(),
        )?);
        let worktrees = Arc::new(WorktreeService::new(
            config.worktree.clone(),
            repo_root.clone(),
        ));
        let blackboard = Arc::new(BlackboardService::new(
            storage.clone(),
            Arc::clone(&event_bus),
        ));
        let mail = Arc::new(MailService::new(storage.clone(), Arc::clone(&event_bus)));
        let checkpoints = Arc::new(CheckpointService::new(storage.clone()));
        let swarms = Arc::new(SwarmService::new(storage.clone()));
        let scheduler = Arc::new(SpawnScheduler::new(
            storage.clone(),
            Arc::clone(&event_bus),
            Arc::clone(&hooks),
            config.max_depth,
            config.max_workers,
            config.scheduler.tick_ms,
        ));
        let workers = Arc::new(WorkerManager::new(
            storage.clone(),
            Arc::clone(&event_bus),
            Arc::clone(&supervisor),
            Arc::clone(&worktrees),
            Arc::clone(&blackboard),
            Arc::clone(&mail),
            Arc::clone(&checkpoints),
            config.clone(),
            repo_root,
        ));

        Ok(Self {
            config,
            db,
            storage,
            event_bus,
            hooks,
            supervisor,
            worktrees,
            blackboard,
            mail,
            checkpoints,
            swarms,
            scheduler,
            workers,
            cancel: CancellationToken::new(),
        })
    }

    /// A fresh wave plan bound to this orchestrator's services.
    pub fn wave_plan(&self) -> WaveOrchestrator {
        WaveOrchestrator::new(
            Arc::clone(&self.workers),
            Arc::clone(&self.supervisor),
            Arc::clone(&self.event_bus),
            self.config.wave.clone(),
            self.config.worker.success_pattern.clone(),
        )
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the orchestrator until cancelled: recover workers, sweep
    /// heartbeats, schedule the spawn queue, and consume approved items.
    pub async fn run(&self) -> OrchestratorResult<()> {
        let recovered = self.workers.recover().await?;
        info!(count = recovered.len(), "startup recovery complete");

        let sweep = {
            let workers = Arc::clone(&self.workers);
            let cancel = self.cancel.clone();
            tokio::spawn(async move { workers.run_heartbeat_sweep(cancel).await })
        };
        let schedule = {
            let scheduler = Arc::clone(&self.scheduler);
            let cancel = self.cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        // Consume approved spawn-queue items until cancelled.
        let consume = {
            let scheduler = Arc::clone(&self.scheduler);
            let workers = Arc::clone(&self.workers);
            let cancel = self.cancel.clone();
            let tick = std::time::Duration::from_millis(self.config.scheduler.tick_ms);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(tick);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            loop {
                                match scheduler.next_ready().await {
                                    Ok(Some(item)) => {
                                        consume_item(&scheduler, &workers, item).await;
                                    }
                                    Ok(None) => break,
                                    Err(e) => {
                                        warn!(error = %e, "spawn queue poll failed");
                                        break;
                                    }
                                }
                            }
                        }
                        () = cancel.cancelled() => return,
                    }
                }
            })
        };

        self.cancel.cancelled().await;
        info!("shutdown requested, dismissing fleet");
        let _ = tokio::join!(sweep, schedule, consume);
        if let Err(e) = self.workers.dismiss_all(true).await {
            warn!(error = %e, "fleet dismissal incomplete");
        }
        self.db.close().await;
        Ok(())
    }
}

/// Launch a worker for an approved queue item and record the outcome.
async fn consume_item(
    scheduler: &SpawnScheduler,
    workers: &WorkerManager,
    item: SpawnQueueItem,
) {
    let handle = queued_handle(&item);
    let mut prompt = item.task.clone();
    if let Some(context) = &item.context {
        prompt.push_str("\n\nContext from the requesting worker:\n");
        prompt.push_str(&context.to_string());
    }

    let options = SpawnOptions {
        handle: handle.clone(),
        role: item.target_role,
        prompt: Some(prompt),
        swarm_id: item.swarm_id.clone(),
        depth: item.depth,
        ..SpawnOptions::default()
    };

    match workers.spawn(options).await {
        Ok(worker) => {
            if let Err(e) = scheduler.mark_spawned(item.id, worker.id).await {
                warn!(item_id = %item.id, error = %e, "failed to mark item spawned");
            }
        }
        Err(e) => {
            warn!(item_id = %item.id, handle, error = %e, "queued spawn failed");
        }
    }
}

/// Deterministic handle for a queued spawn: role plus a short id prefix.
fn queued_handle(item: &SpawnQueueItem) -> String {
    format!(
        "{}-{}",
        item.target_role.as_str(),
        &item.id.simple().to_string()[..6]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::WorkerRole;

    #[test]
    fn test_queued_handle_shape() {
        let item = SpawnQueueItem::new("lead", WorkerRole::Scout, 1, "explore");
        let handle = queued_handle(&item);
        assert!(handle.starts_with("scout-"));
        assert_eq!(handle.len(), "scout-".len() + 6);
    }
}
