//! Wave orchestration: dependency ordering, success patterns, failure halts,
//! iteration, and status snapshots.

mod common;

use flotilla::domain::models::{
    EventKind, OrchestratorEvent, WaveSpec, WaveStatus, WaveWorkerSpec, WorkerRole,
};
use flotilla::services::ExecuteOptions;

use common::{test_config, test_orchestrator};

fn done_worker(handle: &str) -> WaveWorkerSpec {
    WaveWorkerSpec::new(handle, WorkerRole::Worker, "do your part")
        .with_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo DONE".to_string(),
        ])
        .with_success_pattern("DONE")
}

fn failing_worker(handle: &str) -> WaveWorkerSpec {
    WaveWorkerSpec::new(handle, WorkerRole::Worker, "fail fast")
        .with_command(vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()])
        .with_success_pattern("NEVER_PRINTED")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_three_phase_plan_runs_in_dependency_order() {
    let orchestrator = test_orchestrator().await;
    let wave_starts = common::record_events(&orchestrator, &[EventKind::WaveStart]);
    let spawns = common::record_events(&orchestrator, &[EventKind::WorkerSpawned]);

    let plan = orchestrator.wave_plan();
    plan.add_wave(
        WaveSpec::new("discover")
            .with_worker(done_worker("d1"))
            .with_worker(done_worker("d2")),
    )
    .unwrap();
    plan.add_wave(
        WaveSpec::new("design")
            .with_worker(done_worker("a1"))
            .after("discover"),
    )
    .unwrap();
    plan.add_wave(
        WaveSpec::new("implement")
            .with_worker(done_worker("i1"))
            .with_worker(done_worker("i2"))
            .after("design"),
    )
    .unwrap();

    let results = plan.execute(ExecuteOptions::default()).await.expect("plan failed");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status == WaveStatus::Completed));
    assert!(results.iter().all(flotilla::domain::models::WaveResult::all_succeeded));

    // The observed wave:start sequence is exactly discover, design, implement.
    let names: Vec<String> = wave_starts
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::WaveStart { wave, .. } => Some(wave.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["discover", "design", "implement"]);

    // Five workers were spawned in total.
    assert_eq!(spawns.lock().unwrap().len(), 5);

    let status = plan.get_status();
    assert_eq!(status.status, WaveStatus::Completed);
    assert_eq!(status.completed_waves, 3);
    assert_eq!(status.total_waves, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_halts_dependent_waves() {
    let orchestrator = test_orchestrator().await;
    let wave_starts = common::record_events(&orchestrator, &[EventKind::WaveStart]);
    let failures = common::record_events(&orchestrator, &[EventKind::WorkerFailed]);

    let plan = orchestrator.wave_plan();
    plan.add_wave(WaveSpec::new("first").with_worker(failing_worker("f1")))
        .unwrap();
    plan.add_wave(WaveSpec::new("second").with_worker(done_worker("s1")).after("first"))
        .unwrap();

    let results = plan.execute(ExecuteOptions::default()).await.expect("execute errored");

    assert_eq!(results.len(), 1, "the dependent wave must not run");
    assert_eq!(results[0].status, WaveStatus::Failed);
    assert_eq!(failures.lock().unwrap().len(), 1);

    let names: Vec<String> = wave_starts
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::WaveStart { wave, .. } => Some(wave.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["first"]);

    assert_eq!(plan.get_status().status, WaveStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_continue_on_failure_keeps_going() {
    let orchestrator = test_orchestrator().await;

    let plan = orchestrator.wave_plan();
    plan.add_wave(
        WaveSpec::new("flaky")
            .with_worker(failing_worker("f1"))
            .continue_on_failure(),
    )
    .unwrap();
    plan.add_wave(WaveSpec::new("after").with_worker(done_worker("ok1")))
        .unwrap();

    let results = plan.execute(ExecuteOptions::default()).await.expect("execute errored");
    assert_eq!(results.len(), 2, "both waves run despite the failure");
    assert_eq!(results[0].status, WaveStatus::Failed);
    assert_eq!(results[1].status, WaveStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_iteration_until_criteria() {
    let orchestrator = test_orchestrator().await;

    let plan = orchestrator.wave_plan();
    plan.add_wave(WaveSpec::new("only").with_worker(done_worker("w1")))
        .unwrap();

    // An unsatisfiable criteria burns every iteration.
    let results = plan
        .execute(ExecuteOptions {
            max_iterations: 3,
            success_criteria: Some(Box::new(|_| false)),
        })
        .await
        .expect("execute errored");
    assert_eq!(results.len(), 3, "one result per iteration");
    assert_eq!(plan.get_status().status, WaveStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wave_workers_are_dismissed_after_the_wave() {
    let orchestrator = test_orchestrator().await;

    let plan = orchestrator.wave_plan();
    plan.add_wave(WaveSpec::new("only").with_worker(done_worker("w1")))
        .unwrap();
    plan.execute(ExecuteOptions::default()).await.expect("plan failed");

    let worker = orchestrator.workers.get("w1").await.unwrap().unwrap();
    assert_eq!(
        worker.status,
        flotilla::domain::models::WorkerStatus::Dismissed
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wave_timeout_fails_worker() {
    let mut config = test_config();
    config.wave.timeout_ms = 300;
    let orchestrator = common::orchestrator_with(config).await;

    let plan = orchestrator.wave_plan();
    plan.add_wave(
        WaveSpec::new("stuck").with_worker(
            WaveWorkerSpec::new("hang", WorkerRole::Worker, "hang forever")
                .with_command(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    // Print something so idle detection does not fire.
                    "while true; do echo working; sleep 0.1; done".to_string(),
                ])
                .with_success_pattern("NEVER_PRINTED"),
        ),
    )
    .unwrap();

    let results = plan.execute(ExecuteOptions::default()).await.expect("execute errored");
    assert_eq!(results[0].status, WaveStatus::Failed);
    assert!(results[0].workers[0].detail.contains("timeout"));
}
