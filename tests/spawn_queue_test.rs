//! Spawn queue: depth bound, dependency DAG, cycle rejection, approval flow,
//! policy veto, and bounded parallelism.

mod common;

use std::time::Duration;

use flotilla::domain::models::{EventKind, SpawnStatus, WorkerRole};
use flotilla::services::{QueueSpawnOptions, SpawnOptions};
use flotilla::OrchestratorError;

use common::{test_config, test_orchestrator};

#[tokio::test]
async fn test_depth_bound_enforced() {
    let mut config = test_config();
    config.max_depth = 2;
    let orchestrator = common::orchestrator_with(config).await;

    let err = orchestrator
        .scheduler
        .queue_spawn(
            "worker-at-depth-2",
            WorkerRole::Worker,
            3,
            "go deeper",
            QueueSpawnOptions::default(),
        )
        .await
        .expect_err("depth 3 must exceed maxDepth 2");
    assert!(matches!(
        err,
        OrchestratorError::DepthExceeded { depth: 3, max: 2 }
    ));

    // The queue contains no new item.
    assert!(orchestrator.scheduler.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dependency_gates_approval() {
    let orchestrator = test_orchestrator().await;
    let ready_events = common::record_events(&orchestrator, &[EventKind::SpawnReady]);

    let first = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "build the parser",
            QueueSpawnOptions::default(),
        )
        .await
        .unwrap();
    let second = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "test the parser",
            QueueSpawnOptions {
                depends_on: vec![first],
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .unwrap();

    // The independent item is approved; the dependent one stays pending.
    let item = orchestrator.scheduler.get(first).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Approved);
    let item = orchestrator.scheduler.get(second).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Pending);
    assert_eq!(ready_events.lock().unwrap().len(), 1);

    // Once the first item spawns a worker, the second unblocks.
    let worker_id = uuid::Uuid::new_v4();
    orchestrator
        .scheduler
        .mark_spawned(first, worker_id)
        .await
        .unwrap();

    let item = orchestrator.scheduler.get(first).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Spawned);
    assert_eq!(item.worker_id, Some(worker_id));
    let item = orchestrator.scheduler.get(second).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Approved);
    assert_eq!(ready_events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_dependency_rejected() {
    let orchestrator = test_orchestrator().await;
    let err = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "task",
            QueueSpawnOptions {
                depends_on: vec![uuid::Uuid::new_v4()],
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .expect_err("unknown dependency must fail");
    assert!(matches!(err, OrchestratorError::NotFound { .. }));
}

#[tokio::test]
async fn test_cycle_rejected_deterministically() {
    let orchestrator = test_orchestrator().await;

    let a = orchestrator
        .scheduler
        .queue_spawn("lead", WorkerRole::Worker, 1, "a", QueueSpawnOptions::default())
        .await
        .unwrap();
    let b = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "b",
            QueueSpawnOptions {
                depends_on: vec![a],
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .unwrap();

    // Closing the loop a -> b must fail, and fail again on retry.
    for _ in 0..2 {
        let err = orchestrator
            .scheduler
            .add_dependency(a, b)
            .await
            .expect_err("cycle must be rejected");
        assert!(matches!(err, OrchestratorError::DependencyCycle(_)));
    }

    // The offending edge was not inserted.
    let item = orchestrator.scheduler.get(a).await.unwrap().unwrap();
    assert!(item.depends_on.is_empty());
}

#[tokio::test]
async fn test_priority_tie_break() {
    let mut config = test_config();
    // Keep everything pending so ordering is observable after one evaluate.
    config.max_workers = 100;
    let orchestrator = common::orchestrator_with(config).await;

    let low = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "low priority",
            QueueSpawnOptions {
                priority: 1,
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .unwrap();
    let high = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "high priority",
            QueueSpawnOptions {
                priority: 9,
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .unwrap();

    let next = orchestrator.scheduler.next_ready().await.unwrap().unwrap();
    assert_eq!(next.id, high, "higher priority wins");

    let approved = orchestrator
        .scheduler
        .list(Some(SpawnStatus::Approved))
        .await
        .unwrap();
    let ids: Vec<_> = approved.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![high, low]);
}

#[tokio::test]
async fn test_policy_veto_rejects_item() {
    let orchestrator = test_orchestrator().await;
    let rejected = common::record_events(&orchestrator, &[EventKind::SpawnRejected]);

    let id = orchestrator
        .scheduler
        .queue_spawn(
            "rogue",
            WorkerRole::Worker,
            1,
            "run rm -rf / on the build host",
            QueueSpawnOptions::default(),
        )
        .await
        .unwrap();

    let item = orchestrator.scheduler.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Rejected);
    assert_eq!(rejected.lock().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bounded_parallelism() {
    let mut config = test_config();
    config.max_workers = 1;
    let orchestrator = common::orchestrator_with(config).await;

    // Fill the only slot with a live worker.
    orchestrator
        .workers
        .spawn(SpawnOptions {
            handle: "occupant".to_string(),
            role: WorkerRole::Worker,
            ..SpawnOptions::default()
        })
        .await
        .unwrap();

    let id = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "wait your turn",
            QueueSpawnOptions::default(),
        )
        .await
        .unwrap();

    let item = orchestrator.scheduler.get(id).await.unwrap().unwrap();
    assert_eq!(
        item.status,
        SpawnStatus::Pending,
        "no approval while the fleet is at capacity"
    );

    // Freeing the slot lets the next evaluation approve it.
    orchestrator.workers.dismiss("occupant", true).await.unwrap();
    orchestrator.scheduler.evaluate().await.unwrap();
    let item = orchestrator.scheduler.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Approved);
}

#[tokio::test]
async fn test_cancel_rejects_everything_open() {
    let orchestrator = test_orchestrator().await;

    let a = orchestrator
        .scheduler
        .queue_spawn("lead", WorkerRole::Worker, 1, "a", QueueSpawnOptions::default())
        .await
        .unwrap();
    let b = orchestrator
        .scheduler
        .queue_spawn(
            "lead",
            WorkerRole::Worker,
            1,
            "b",
            QueueSpawnOptions {
                depends_on: vec![a],
                ..QueueSpawnOptions::default()
            },
        )
        .await
        .unwrap();

    let rejected = orchestrator.scheduler.cancel_pending().await.unwrap();
    assert_eq!(rejected, 2);
    for id in [a, b] {
        let item = orchestrator.scheduler.get(id).await.unwrap().unwrap();
        assert_eq!(item.status, SpawnStatus::Rejected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scheduler_loop_rejects_on_cancel() {
    let orchestrator = test_orchestrator().await;
    let cancel = tokio_util::sync::CancellationToken::new();

    let id = orchestrator
        .scheduler
        .queue_spawn("lead", WorkerRole::Worker, 1, "task", QueueSpawnOptions::default())
        .await
        .unwrap();

    let scheduler = std::sync::Arc::clone(&orchestrator.scheduler);
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { scheduler.run(run_cancel).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    handle.await.unwrap();

    let item = orchestrator.scheduler.get(id).await.unwrap().unwrap();
    assert_eq!(item.status, SpawnStatus::Rejected);
}
