//! Wave orchestrator.
//!
//! Executes a plan: an ordered DAG of named waves, each a group of workers
//! spawned together. A wave starts only after every wave it depends on has
//! completed; within a wave, workers run in parallel and complete on a
//! success predicate over their output, idleness, or exit. The whole plan
//! can iterate until a success criteria over the results holds.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    OrchestratorEvent, PlanStatus, WaveConfig, WaveResult, WaveSnapshot, WaveSpec, WaveStatus,
    WorkerOutcome,
};

use super::event_bus::EventBus;
use super::process_supervisor::ProcessSupervisor;
use super::worker_manager::{SpawnOptions, WorkerManager};

/// Success criteria over one iteration's results.
pub type SuccessCriteria = Box<dyn Fn(&[WaveResult]) -> bool + Send + Sync>;

/// Options for executing a plan.
#[derive(Default)]
pub struct ExecuteOptions {
    /// Iterations of the whole plan before giving up; 0 is treated as 1
    pub max_iterations: u32,
    /// Defaults to "every worker in every wave succeeded"
    pub success_criteria: Option<SuccessCriteria>,
}

#[derive(Debug, Default)]
struct PlanState {
    status: Option<WaveStatus>,
    current_wave: Option<String>,
    completed: Vec<String>,
    wave_status: HashMap<String, WaveStatus>,
}

pub struct WaveOrchestrator {
    manager: Arc<WorkerManager>,
    supervisor: Arc<ProcessSupervisor>,
    event_bus: Arc<EventBus>,
    config: WaveConfig,
    default_success_pattern: String,
    waves: Mutex<Vec<WaveSpec>>,
    state: Mutex<PlanState>,
    cancel: CancellationToken,
}

impl WaveOrchestrator {
    pub fn new(
        manager: Arc<WorkerManager>,
        supervisor: Arc<ProcessSupervisor>,
        event_bus: Arc<EventBus>,
        config: WaveConfig,
        default_success_pattern: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            supervisor,
            event_bus,
            config,
            default_success_pattern: default_success_pattern.into(),
            waves: Mutex::new(Vec::new()),
            state: Mutex::new(PlanState::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Add a wave to the plan. Names must be unique; dependencies may
    /// reference waves added later.
    pub fn add_wave(&self, wave: WaveSpec) -> OrchestratorResult<()> {
        let mut waves = self.waves.lock().unwrap_or_else(|e| e.into_inner());
        if waves.iter().any(|w| w.name == wave.name) {
            return Err(OrchestratorError::ValidationFailed(format!(
                "duplicate wave name '{}'",
                wave.name
            )));
        }
        waves.push(wave);
        Ok(())
    }

    /// Execute the plan. Blocks for the duration unless cancelled.
    #[instrument(skip(self, options))]
    pub async fn execute(&self, options: ExecuteOptions) -> OrchestratorResult<Vec<WaveResult>> {
        let waves: Vec<WaveSpec> = {
            let waves = self.waves.lock().unwrap_or_else(|e| e.into_inner());
            waves.clone()
        };
        if waves.is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "plan has no waves".to_string(),
            ));
        }
        let ordered = topo_order(&waves)?;
        let max_iterations = options.max_iterations.max(1);

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.status = Some(WaveStatus::Running);
            state.wave_status = waves
                .iter()
                .map(|w| (w.name.clone(), WaveStatus::Pending))
                .collect();
        }

        let mut results = Vec::new();
        for iteration in 1..=max_iterations {
            let iteration_results = self.run_iteration(&waves, &ordered, iteration).await?;
            let halted = iteration_results
                .iter()
                .any(|r| r.status == WaveStatus::Failed || r.status == WaveStatus::Cancelled);
            results.extend(iteration_results);

            if self.cancel.is_cancelled() {
                self.set_plan_status(WaveStatus::Cancelled);
                return Err(OrchestratorError::Cancelled);
            }

            let satisfied = match &options.success_criteria {
                Some(criteria) => criteria(&results),
                None => !halted && results.iter().all(WaveResult::all_succeeded),
            };
            if satisfied {
                self.set_plan_status(WaveStatus::Completed);
                info!(iteration, "plan succeeded");
                return Ok(results);
            }
            if iteration < max_iterations {
                info!(iteration, "success criteria not met, iterating");
            }
        }

        self.set_plan_status(WaveStatus::Failed);
        Ok(results)
    }

    async fn run_iteration(
        &self,
        waves: &[WaveSpec],
        ordered: &[String],
        iteration: u32,
    ) -> OrchestratorResult<Vec<WaveResult>> {
        let by_name: HashMap<&str, &WaveSpec> =
            waves.iter().map(|w| (w.name.as_str(), w)).collect();
        let mut completed_ok: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        let mut halted = false;

        for name in ordered {
            let wave = by_name[name.as_str()];
            if halted {
                break;
            }
            // All dependencies must have completed successfully.
            if !wave
                .after_waves
                .iter()
                .all(|dep| completed_ok.contains(dep))
            {
                continue;
            }

            let result = self.run_wave(wave, iteration).await?;
            let wave_ok = result.status == WaveStatus::Completed && result.all_succeeded();
            let failed = !wave_ok;

            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.completed.push(wave.name.clone());
                state.wave_status.insert(wave.name.clone(), result.status);
            }
            if wave_ok {
                completed_ok.insert(wave.name.clone());
            }
            if failed && !wave.continue_on_failure {
                halted = true;
            }
            results.push(result);

            if self.cancel.is_cancelled() {
                break;
            }
        }

        Ok(results)
    }

    async fn run_wave(&self, wave: &WaveSpec, iteration: u32) -> OrchestratorResult<WaveResult> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.current_wave = Some(wave.name.clone());
            state.wave_status.insert(wave.name.clone(), WaveStatus::Running);
        }
        self.event_bus.emit(OrchestratorEvent::WaveStart {
            wave: wave.name.clone(),
            iteration,
        });
        info!(wave = %wave.name, iteration, workers = wave.workers.len(), "wave starting");

        // Spawn the wave's workers in parallel.
        let spawns = wave.workers.iter().map(|spec| {
            let options = SpawnOptions {
                handle: spec.handle.clone(),
                role: spec.role,
                prompt: Some(spec.prompt.clone()),
                working_dir: None,
                worktree: spec.worktree,
                swarm_id: None,
                depth: 0,
                command: spec.command.clone(),
                success_pattern: Some(
                    spec.success_pattern
                        .clone()
                        .unwrap_or_else(|| self.default_success_pattern.clone()),
                ),
            };
            self.manager.spawn(options)
        });
        let spawned = futures::future::join_all(spawns).await;

        let mut outcomes = Vec::new();
        let mut running = Vec::new();
        for (spec, spawn_result) in wave.workers.iter().zip(spawned) {
            match spawn_result {
                Ok(_) => running.push(spec.handle.clone()),
                Err(e) => {
                    warn!(handle = %spec.handle, error = %e, "wave worker failed to spawn");
                    outcomes.push(WorkerOutcome {
                        handle: spec.handle.clone(),
                        success: false,
                        detail: format!("spawn failed: {e}"),
                    });
                }
            }
        }

        let timeout = Duration::from_millis(wave.timeout_ms.unwrap_or(self.config.timeout_ms));
        let deadline = tokio::time::Instant::now() + timeout;
        let poll = Duration::from_millis(self.config.poll_ms);
        let mut cancelled = false;

        while !running.is_empty() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }

            running.retain(|handle| {
                if self.supervisor.success_matched(handle) {
                    outcomes.push(WorkerOutcome {
                        handle: handle.clone(),
                        success: true,
                        detail: "success pattern matched".to_string(),
                    });
                    return false;
                }
                if let Some(exit) = self.supervisor.exit_status(handle) {
                    let success = exit == Some(0);
                    outcomes.push(WorkerOutcome {
                        handle: handle.clone(),
                        success,
                        detail: format!("exited with {exit:?}"),
                    });
                    return false;
                }
                if self.supervisor.is_idle(handle) {
                    outcomes.push(WorkerOutcome {
                        handle: handle.clone(),
                        success: true,
                        detail: "idle at prompt".to_string(),
                    });
                    return false;
                }
                true
            });

            if running.is_empty() {
                break;
            }
            tokio::time::sleep(poll).await;
        }

        // Whatever is still running timed out or was cancelled.
        for handle in &running {
            outcomes.push(WorkerOutcome {
                handle: handle.clone(),
                success: false,
                detail: if cancelled { "cancelled" } else { "wave timeout" }.to_string(),
            });
        }

        // Wave workers are one-shot: dismiss them before moving on.
        for spec in &wave.workers {
            if let Err(e) = self.manager.dismiss(&spec.handle, true).await {
                warn!(handle = %spec.handle, error = %e, "wave worker dismissal failed");
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let failed = outcomes.len() - succeeded;
        for outcome in &outcomes {
            if outcome.success {
                self.event_bus.emit(OrchestratorEvent::WorkerSuccess {
                    handle: outcome.handle.clone(),
                    wave: wave.name.clone(),
                });
            } else {
                self.event_bus.emit(OrchestratorEvent::WorkerFailed {
                    handle: outcome.handle.clone(),
                    wave: wave.name.clone(),
                    reason: outcome.detail.clone(),
                });
            }
        }

        let status = if cancelled {
            WaveStatus::Cancelled
        } else if failed > 0 {
            WaveStatus::Failed
        } else {
            WaveStatus::Completed
        };
        self.event_bus.emit(OrchestratorEvent::WaveComplete {
            wave: wave.name.clone(),
            succeeded,
            failed,
        });
        info!(wave = %wave.name, succeeded, failed, "wave complete");

        Ok(WaveResult {
            wave: wave.name.clone(),
            iteration,
            status,
            workers: outcomes,
        })
    }

    /// Cancel the plan: in-flight waves abort and their workers are
    /// dismissed by the executing task.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.set_plan_status(WaveStatus::Cancelled);
    }

    pub fn get_status(&self) -> PlanStatus {
        let waves = self.waves.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        PlanStatus {
            status: state.status.unwrap_or(WaveStatus::Pending),
            current_wave: state.current_wave.clone(),
            completed_waves: state.completed.len(),
            total_waves: waves.len(),
            waves: waves
                .iter()
                .map(|w| WaveSnapshot {
                    name: w.name.clone(),
                    status: state
                        .wave_status
                        .get(&w.name)
                        .copied()
                        .unwrap_or(WaveStatus::Pending),
                    worker_count: w.workers.len(),
                })
                .collect(),
        }
    }

    fn set_plan_status(&self, status: WaveStatus) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.status = Some(status);
        state.current_wave = None;
    }
}

/// Topological order over `after_waves` edges, stable with respect to
/// insertion order. Fails on unknown references and cycles.
fn topo_order(waves: &[WaveSpec]) -> OrchestratorResult<Vec<String>> {
    let known: HashSet<&str> = waves.iter().map(|w| w.name.as_str()).collect();
    for wave in waves {
        for dep in &wave.after_waves {
            if !known.contains(dep.as_str()) {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "wave '{}' depends on unknown wave '{dep}'",
                    wave.name
                )));
            }
        }
    }

    let mut remaining: Vec<&WaveSpec> = waves.iter().collect();
    let mut ordered = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let before = ordered.len();
        remaining.retain(|wave| {
            if wave.after_waves.iter().all(|dep| placed.contains(dep)) {
                ordered.push(wave.name.clone());
                placed.insert(wave.name.clone());
                false
            } else {
                true
            }
        });
        if ordered.len() == before {
            return Err(OrchestratorError::ValidationFailed(
                "wave dependencies form a cycle".to_string(),
            ));
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::WaveSpec;

    fn wave(name: &str, after: &[&str]) -> WaveSpec {
        let mut spec = WaveSpec::new(name);
        for dep in after {
            spec = spec.after(*dep);
        }
        spec
    }

    #[test]
    fn test_topo_order_linear() {
        let waves = vec![
            wave("discover", &[]),
            wave("design", &["discover"]),
            wave("implement", &["design"]),
        ];
        let ordered = topo_order(&waves).unwrap();
        assert_eq!(ordered, vec!["discover", "design", "implement"]);
    }

    #[test]
    fn test_topo_order_stable_for_independent_waves() {
        let waves = vec![wave("b", &[]), wave("a", &[]), wave("c", &["b"])];
        let ordered = topo_order(&waves).unwrap();
        assert_eq!(ordered, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_topo_rejects_cycle() {
        let waves = vec![wave("a", &["b"]), wave("b", &["a"])];
        assert!(topo_order(&waves).is_err());
    }

    #[test]
    fn test_topo_rejects_unknown_dependency() {
        let waves = vec![wave("a", &["ghost"])];
        assert!(topo_order(&waves).is_err());
    }
}
