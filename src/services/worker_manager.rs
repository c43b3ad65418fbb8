//! Worker manager: lifecycle and supervision.
//!
//! Owns every Worker exclusively: spawn, state transitions, heartbeats,
//! crash recovery, dismissal. Spawning takes the handle's lock for the whole
//! reserve-then-launch-then-record sequence, so the handle-uniqueness and
//! capacity invariants hold under concurrent callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    is_valid_handle, MessagePriority, MessageType, OrchestratorConfig, OrchestratorEvent, Worker,
    WorkerRole, WorkerStatus, TOPIC_BROADCAST,
};
use crate::domain::ports::{Storage, WorkerFilter};

use super::blackboard_service::{BlackboardService, PostOptions};
use super::checkpoint_service::CheckpointService;
use super::event_bus::EventBus;
use super::mail_service::MailService;
use super::process_supervisor::{ProcessSupervisor, SpawnSpec};
use super::prompt::{self, PromptParts};
use super::worktree_service::WorktreeService;

/// Options for spawning one worker.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub handle: String,
    pub role: WorkerRole,
    /// Initial prompt text
    pub prompt: Option<String>,
    /// Working directory when no worktree is used
    pub working_dir: Option<PathBuf>,
    /// Override for worktree creation; `None` follows configuration
    pub worktree: Option<bool>,
    pub swarm_id: Option<String>,
    /// Spawn-chain depth (root = 0)
    pub depth: u32,
    /// Command vector override; `None` uses the configured worker command
    pub command: Option<Vec<String>>,
    /// Success predicate pattern, for wave bookkeeping
    pub success_pattern: Option<String>,
}

pub struct WorkerManager {
    storage: Storage,
    event_bus: Arc<EventBus>,
    supervisor: Arc<ProcessSupervisor>,
    worktrees: Arc<WorktreeService>,
    blackboard: Arc<BlackboardService>,
    mail: Arc<MailService>,
    checkpoints: Arc<CheckpointService>,
    config: OrchestratorConfig,
    default_working_dir: PathBuf,
    handle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Per-handle command overrides (wave workers, tests). Process-local:
    /// recovery after a restart falls back to the configured command.
    command_overrides: Mutex<HashMap<String, Vec<String>>>,
    success_overrides: Mutex<HashMap<String, String>>,
}

impl WorkerManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Storage,
        event_bus: Arc<EventBus>,
        supervisor: Arc<ProcessSupervisor>,
        worktrees: Arc<WorktreeService>,
        blackboard: Arc<BlackboardService>,
        mail: Arc<MailService>,
        checkpoints: Arc<CheckpointService>,
        config: OrchestratorConfig,
        default_working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            event_bus,
            supervisor,
            worktrees,
            blackboard,
            mail,
            checkpoints,
            config,
            default_working_dir: default_working_dir.into(),
            handle_locks: Mutex::new(HashMap::new()),
            command_overrides: Mutex::new(HashMap::new()),
            success_overrides: Mutex::new(HashMap::new()),
        }
    }

    fn clear_overrides(&self, handle: &str) {
        self.command_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(handle);
        self.success_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(handle);
    }

    fn handle_lock(&self, handle: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.handle_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(handle.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn compile(pattern: &str) -> OrchestratorResult<Regex> {
        Regex::new(pattern)
            .map_err(|e| OrchestratorError::ValidationFailed(format!("bad pattern: {e}")))
    }

    /// Spawn a new worker.
    ///
    /// Preconditions: the handle is free among non-dismissed workers and the
    /// fleet is under capacity. Effects: worker row, optional worktree,
    /// composed prompt, subprocess, recorded pid, `worker:spawned`.
    #[instrument(skip(self, options), fields(handle = %options.handle, role = %options.role))]
    pub async fn spawn(&self, options: SpawnOptions) -> OrchestratorResult<Worker> {
        if !is_valid_handle(&options.handle) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "invalid handle '{}'",
                options.handle
            )));
        }

        let lock = self.handle_lock(&options.handle);
        let _guard = lock.lock().await;

        if let Some(live) = self
            .storage
            .workers
            .get_live_by_handle(&options.handle)
            .await?
        {
            return Err(OrchestratorError::HandleTaken(live.handle));
        }

        let live_count = self.storage.workers.count_live().await?;
        if live_count >= self.config.max_workers {
            return Err(OrchestratorError::CapacityExceeded {
                current: live_count,
                max: self.config.max_workers,
            });
        }

        let working_dir = options
            .working_dir
            .clone()
            .unwrap_or_else(|| self.default_working_dir.clone());
        let mut worker = Worker::new(
            &options.handle,
            options.role,
            working_dir.to_string_lossy().to_string(),
        )
        .with_depth(options.depth);
        if let Some(swarm_id) = &options.swarm_id {
            worker = worker.with_swarm(swarm_id.clone());
        }
        if let Some(prompt) = &options.prompt {
            worker = worker.with_prompt(prompt.clone());
        }

        if let Some(command) = &options.command {
            self.command_overrides
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(options.handle.clone(), command.clone());
        }
        if let Some(pattern) = &options.success_pattern {
            self.success_overrides
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(options.handle.clone(), pattern.clone());
        }

        self.storage.workers.insert(&worker).await?;

        let use_worktree = options.worktree.unwrap_or(self.config.worktree.enabled);
        if use_worktree {
            match self.worktrees.create(worker.id).await {
                Ok(info) => {
                    let path = info.path.to_string_lossy().to_string();
                    self.storage
                        .workers
                        .update_worktree(
                            worker.id,
                            Some(path.clone()),
                            Some(info.branch.clone()),
                            Some(path.clone()),
                        )
                        .await?;
                    worker.worktree_path = Some(path.clone());
                    worker.branch = Some(info.branch);
                    worker.working_dir = path;
                }
                Err(e) => {
                    error!(handle = %options.handle, error = %e, "worktree creation failed");
                    self.storage.workers.dismiss(worker.id, Utc::now()).await?;
                    self.clear_overrides(&options.handle);
                    return Err(e);
                }
            }
        }

        match self.launch(&worker, false).await {
            Ok(pid) => {
                worker.pid = Some(pid);
            }
            Err(e) => {
                error!(handle = %options.handle, error = %e, "subprocess launch failed");
                if use_worktree {
                    self.worktrees.remove(worker.id).await;
                }
                self.storage.workers.dismiss(worker.id, Utc::now()).await?;
                self.clear_overrides(&options.handle);
                return Err(e);
            }
        }

        self.event_bus.emit(OrchestratorEvent::WorkerSpawned {
            worker_id: worker.id,
            handle: worker.handle.clone(),
        });
        info!(handle = %worker.handle, pid = ?worker.pid, "worker spawned");
        Ok(worker)
    }

    /// Compose the prompt and launch the subprocess for a worker row.
    /// `recovering` adds the latest checkpoint section.
    async fn launch(&self, worker: &Worker, recovering: bool) -> OrchestratorResult<u32> {
        let mail = self.mail.get_unread(&worker.handle).await?;
        let handoffs = self.mail.get_pending_handoffs(&worker.handle).await?;
        let checkpoint = if recovering {
            self.checkpoints.load_latest(&worker.handle).await?
        } else {
            None
        };

        let parts = PromptParts {
            initial_prompt: worker.initial_prompt.as_deref(),
            mail: &mail,
            handoffs: &handoffs,
            checkpoint: checkpoint.as_ref(),
        };
        let full_prompt = prompt::compose(worker.role, &parts);

        let command = self.command_for(worker);
        let ready_pattern = Some(Self::compile(&self.config.worker.ready_pattern)?);
        let success_pattern = self
            .success_pattern_for(worker)
            .map(|p| Self::compile(&p))
            .transpose()?;

        // Subscribe before launch so an early ready marker is not missed.
        let events = self.event_bus.subscribe();

        let pid = self
            .supervisor
            .spawn(SpawnSpec {
                worker_id: worker.id,
                handle: worker.handle.clone(),
                role: worker.role,
                command,
                working_dir: PathBuf::from(&worker.working_dir),
                initial_prompt: Some(full_prompt),
                ready_pattern,
                success_pattern,
            })
            .await?;

        self.storage.workers.update_pid(worker.id, Some(pid)).await?;
        self.install_listener(worker.handle.clone(), events);
        Ok(pid)
    }

    fn command_for(&self, worker: &Worker) -> Vec<String> {
        self.command_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&worker.handle)
            .cloned()
            .unwrap_or_else(|| self.config.worker.command.clone())
    }

    fn success_pattern_for(&self, worker: &Worker) -> Option<String> {
        self.success_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&worker.handle)
            .cloned()
    }

    /// Track lifecycle transitions driven by the process itself.
    fn install_listener(
        &self,
        handle: String,
        mut rx: tokio::sync::broadcast::Receiver<OrchestratorEvent>,
    ) {
        let storage = self.storage.clone();
        let event_bus = Arc::clone(&self.event_bus);
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                };
                match event {
                    OrchestratorEvent::WorkerReady { handle: h } if h == handle => {
                        let Ok(Some(worker)) = storage.workers.get_live_by_handle(&handle).await
                        else {
                            return;
                        };
                        if worker.status == WorkerStatus::Pending {
                            if let Err(e) = storage
                                .workers
                                .update_status(worker.id, WorkerStatus::Ready)
                                .await
                            {
                                warn!(handle = %handle, error = %e, "ready transition failed");
                            }
                        }
                    }
                    OrchestratorEvent::WorkerExited { handle: h, exit_code } if h == handle => {
                        let Ok(Some(worker)) = storage.workers.get_live_by_handle(&handle).await
                        else {
                            return;
                        };
                        match worker.status {
                            WorkerStatus::Stopping => {
                                let _ = storage
                                    .workers
                                    .update_status(worker.id, WorkerStatus::Stopped)
                                    .await;
                            }
                            WorkerStatus::Pending | WorkerStatus::Ready | WorkerStatus::Busy => {
                                let _ = storage
                                    .workers
                                    .update_status(worker.id, WorkerStatus::Error)
                                    .await;
                                event_bus.emit(OrchestratorEvent::WorkerError {
                                    handle: handle.clone(),
                                    reason: format!("process exited with {exit_code:?}"),
                                });
                            }
                            _ => {}
                        }
                        return;
                    }
                    OrchestratorEvent::WorkerDismissed { handle: h } if h == handle => {
                        return;
                    }
                    _ => {}
                }
            }
        });
    }

    /// Dismiss a worker: terminate, remove the worktree, mark dismissed.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn dismiss(&self, handle: &str, graceful: bool) -> OrchestratorResult<()> {
        let lock = self.handle_lock(handle);
        let _guard = lock.lock().await;

        let Some(worker) = self.storage.workers.get_live_by_handle(handle).await? else {
            // Already dismissed is success; never-existed is not.
            return match self.storage.workers.get_by_handle(handle).await? {
                Some(_) => Ok(()),
                None => Err(OrchestratorError::NotFound {
                    entity: "worker",
                    id: handle.to_string(),
                }),
            };
        };

        self.storage
            .workers
            .update_status(worker.id, WorkerStatus::Stopping)
            .await?;

        if graceful {
            if let Err(e) = self.supervisor.terminate(handle).await {
                debug!(handle, error = %e, "terminate failed (process may be gone)");
            }
        } else if let Some(pid) = self.supervisor.pid(handle).or(worker.pid) {
            ProcessSupervisor::kill_pid(pid);
        }
        self.supervisor.remove(handle);

        if worker.worktree_path.is_some() {
            self.worktrees.remove(worker.id).await;
        }

        self.storage.workers.dismiss(worker.id, Utc::now()).await?;
        self.clear_overrides(handle);
        self.event_bus.emit(OrchestratorEvent::WorkerDismissed {
            handle: handle.to_string(),
        });
        info!(handle, "worker dismissed");
        Ok(())
    }

    /// Record a heartbeat for a live worker.
    pub async fn heartbeat(&self, handle: &str) -> OrchestratorResult<()> {
        self.storage.workers.heartbeat(handle, Utc::now()).await
    }

    pub async fn get(&self, handle: &str) -> OrchestratorResult<Option<Worker>> {
        self.storage.workers.get_by_handle(handle).await
    }

    pub async fn list(&self, filter: WorkerFilter) -> OrchestratorResult<Vec<Worker>> {
        self.storage.workers.list(filter).await
    }

    /// Explicit state update (ready ↔ busy and friends). Transitions outside
    /// the lifecycle state machine fail with `InvalidState`.
    pub async fn update_status(
        &self,
        handle: &str,
        status: WorkerStatus,
    ) -> OrchestratorResult<()> {
        let worker = self
            .storage
            .workers
            .get_live_by_handle(handle)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "worker",
                id: handle.to_string(),
            })?;
        if !worker.status.can_transition_to(status) {
            return Err(OrchestratorError::InvalidState {
                entity: "worker",
                id: handle.to_string(),
                reason: format!("cannot transition {} -> {}", worker.status, status),
            });
        }
        self.storage.workers.update_status(worker.id, status).await
    }

    /// Post a fleet-wide announcement on the blackboard `broadcast` topic
    /// with elevated priority.
    pub async fn broadcast(
        &self,
        message: &str,
        from_handle: Option<&str>,
    ) -> OrchestratorResult<usize> {
        let sender = from_handle.unwrap_or("orchestrator");
        let swarms: Vec<String> = match from_handle {
            Some(handle) => match self.storage.workers.get_live_by_handle(handle).await? {
                Some(worker) => worker.swarm_id.into_iter().collect(),
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        let swarms = if swarms.is_empty() {
            self.storage
                .swarms
                .list()
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect()
        } else {
            swarms
        };

        for swarm_id in &swarms {
            self.blackboard
                .post_topic(
                    swarm_id,
                    sender,
                    TOPIC_BROADCAST,
                    MessageType::Directive,
                    serde_json::json!({ "message": message }),
                    PostOptions {
                        priority: Some(MessagePriority::High),
                        ..PostOptions::default()
                    },
                )
                .await?;
        }
        Ok(swarms.len())
    }

    /// Recover workers after an orchestrator restart.
    ///
    /// Every worker left in a recoverable state gets its restart counter
    /// incremented; past the budget it lands in `error`, otherwise it is
    /// re-spawned with a recovery prompt carrying its latest checkpoint.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> OrchestratorResult<Vec<Worker>> {
        let candidates = self.storage.workers.get_recoverable().await?;
        let mut recovered = Vec::new();

        for worker in candidates {
            let lock = self.handle_lock(&worker.handle);
            let _guard = lock.lock().await;

            // The previous process is gone or orphaned; kill the orphan.
            if let Some(pid) = worker.pid {
                ProcessSupervisor::kill_pid(pid);
            }

            let restart_count = self.storage.workers.increment_restart(worker.id).await?;
            if restart_count > self.config.max_restarts {
                warn!(handle = %worker.handle, restart_count, "restart budget exhausted");
                self.storage
                    .workers
                    .update_status(worker.id, WorkerStatus::Error)
                    .await?;
                self.event_bus.emit(OrchestratorEvent::WorkerError {
                    handle: worker.handle.clone(),
                    reason: format!("restart budget exhausted after {restart_count} attempts"),
                });
                continue;
            }

            let mut worker = worker;
            worker.restart_count = restart_count;
            if worker.status != WorkerStatus::Pending {
                self.storage
                    .workers
                    .update_status(worker.id, WorkerStatus::Error)
                    .await?;
                self.storage
                    .workers
                    .update_status(worker.id, WorkerStatus::Pending)
                    .await?;
                worker.status = WorkerStatus::Pending;
            }

            match self.launch(&worker, true).await {
                Ok(pid) => {
                    worker.pid = Some(pid);
                    self.event_bus.emit(OrchestratorEvent::WorkerRecovered {
                        handle: worker.handle.clone(),
                        restart_count,
                    });
                    info!(handle = %worker.handle, restart_count, "worker recovered");
                    recovered.push(worker);
                }
                Err(e) => {
                    error!(handle = %worker.handle, error = %e, "recovery launch failed");
                    self.storage
                        .workers
                        .update_status(worker.id, WorkerStatus::Error)
                        .await?;
                    self.event_bus.emit(OrchestratorEvent::WorkerError {
                        handle: worker.handle.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(recovered)
    }

    /// One pass of the heartbeat sweep: stale workers land in `error` and
    /// their orphan processes are killed.
    pub async fn sweep_stale(&self) -> OrchestratorResult<Vec<String>> {
        let stale = self
            .storage
            .workers
            .get_stale(self.config.heartbeat.stale_threshold_ms, Utc::now())
            .await?;
        let mut handles = Vec::new();
        for worker in stale {
            warn!(handle = %worker.handle, "worker heartbeat stale");
            self.storage
                .workers
                .update_status(worker.id, WorkerStatus::Error)
                .await?;
            if let Some(pid) = self.supervisor.pid(&worker.handle).or(worker.pid) {
                ProcessSupervisor::kill_pid(pid);
            }
            self.supervisor.remove(&worker.handle);
            self.event_bus.emit(OrchestratorEvent::WorkerStale {
                handle: worker.handle.clone(),
            });
            handles.push(worker.handle);
        }
        Ok(handles)
    }

    /// Periodic heartbeat sweep loop.
    pub async fn run_heartbeat_sweep(&self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat.interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_stale().await {
                        warn!(error = %e, "heartbeat sweep failed");
                    }
                }
                () = cancel.cancelled() => return,
            }
        }
    }

    /// Dismiss every live worker. Used on orchestrator shutdown/cancel.
    pub async fn dismiss_all(&self, graceful: bool) -> OrchestratorResult<usize> {
        let workers = self.storage.workers.list(WorkerFilter::default()).await?;
        let mut dismissed = 0;
        for worker in workers {
            if let Err(e) = self.dismiss(&worker.handle, graceful).await {
                warn!(handle = %worker.handle, error = %e, "dismissal failed");
            } else {
                dismissed += 1;
            }
        }
        Ok(dismissed)
    }
}
