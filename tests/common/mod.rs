//! Shared fixtures for integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flotilla::domain::models::{EventKind, OrchestratorConfig, OrchestratorEvent};
use flotilla::Orchestrator;

/// Shell command that announces readiness and then stays alive.
pub fn idle_worker_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo READY; sleep 300".to_string(),
    ]
}

/// Shell command that echoes every prompt line back on stdout.
pub fn echo_worker_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo READY; while IFS= read -r line; do echo \"$line\"; done".to_string(),
    ]
}

/// Configuration suitable for fast, hermetic tests: in-memory-friendly pool,
/// no worktrees, snappy intervals, harmless worker command.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.worktree.enabled = false;
    // A single pool connection keeps `sqlite::memory:` one database.
    config.database.max_connections = 1;
    config.worker.command = idle_worker_command();
    config.worker.terminate_grace_ms = 500;
    config.worker.idle_stable_ms = 200;
    config.heartbeat.interval_ms = 100;
    config.heartbeat.stale_threshold_ms = 60_000;
    config.scheduler.tick_ms = 50;
    config.wave.timeout_ms = 20_000;
    config.wave.poll_ms = 25;
    config
}

pub async fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::build_with_url(config, "sqlite::memory:", std::env::temp_dir())
        .await
        .expect("failed to build orchestrator")
}

pub async fn test_orchestrator() -> Orchestrator {
    orchestrator_with(test_config()).await
}

/// Collect every event of the given kinds into a shared vector.
pub fn record_events(
    orchestrator: &Orchestrator,
    kinds: &[EventKind],
) -> Arc<Mutex<Vec<OrchestratorEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let sink = Arc::clone(&events);
        orchestrator.event_bus.on(*kind, move |event| {
            sink.lock().unwrap().push(event.clone());
        });
    }
    events
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_for<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
