//! Durable tasks, work items, and batch dispatch.

mod common;

use flotilla::domain::models::{Batch, Task, TaskStatus, WorkItem, WorkItemStatus};
use flotilla::domain::ports::TaskFilter;

use common::test_orchestrator;

#[tokio::test]
async fn test_task_crud_and_filters() {
    let orchestrator = test_orchestrator().await;
    let tasks = &orchestrator.storage.tasks;

    let mut task = Task::new("wire up the parser");
    task.team = Some("core".to_string());
    tasks.create(&task).await.unwrap();

    let stored = tasks.get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.subject, "wire up the parser");
    assert_eq!(stored.status, TaskStatus::Open);

    tasks.assign(task.id, Some("alice".to_string())).await.unwrap();
    tasks.update_status(task.id, TaskStatus::InProgress).await.unwrap();

    let in_progress = tasks
        .list(TaskFilter {
            status: Some(TaskStatus::InProgress),
            ..TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].owner.as_deref(), Some("alice"));

    let core_team = tasks
        .list(TaskFilter {
            team: Some("core".to_string()),
            ..TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(core_team.len(), 1);
}

#[tokio::test]
async fn test_task_blocked_by_round_trip() {
    let orchestrator = test_orchestrator().await;
    let tasks = &orchestrator.storage.tasks;

    let blocker = Task::new("land the schema");
    tasks.create(&blocker).await.unwrap();
    let blocked = Task::new("migrate the data");
    tasks.create(&blocked).await.unwrap();

    tasks.set_blocked_by(blocked.id, &[blocker.id]).await.unwrap();
    let stored = tasks.get(blocked.id).await.unwrap().unwrap();
    assert_eq!(stored.blocked_by, vec![blocker.id]);
}

#[tokio::test]
async fn test_batch_dispatch_moves_pending_items_atomically() {
    let orchestrator = test_orchestrator().await;
    let work_items = &orchestrator.storage.work_items;

    let batch = Batch::new("sprint-1");
    work_items.create_batch(&batch).await.unwrap();

    for subject in ["item a", "item b", "item c"] {
        work_items
            .create_item(&WorkItem::new(subject).in_batch(batch.id))
            .await
            .unwrap();
    }
    // One item already completed; dispatch must leave it alone.
    let done = WorkItem::new("item d").in_batch(batch.id);
    work_items.create_item(&done).await.unwrap();
    work_items
        .update_item_status(done.id, WorkItemStatus::Completed)
        .await
        .unwrap();

    let moved = work_items.dispatch_batch(batch.id).await.unwrap();
    assert_eq!(moved, 3);

    let items = work_items.list_items(batch.id).await.unwrap();
    let in_progress = items
        .iter()
        .filter(|i| i.status == WorkItemStatus::InProgress)
        .count();
    assert_eq!(in_progress, 3);
    assert_eq!(
        items.iter().filter(|i| i.status == WorkItemStatus::Completed).count(),
        1
    );

    let stored = orchestrator
        .storage
        .work_items
        .get_batch(batch.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.dispatched_at.is_some());
}

#[tokio::test]
async fn test_swarm_delete_guard() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("guarded", 5).await.unwrap();

    orchestrator
        .workers
        .spawn(flotilla::services::SpawnOptions {
            handle: "member".to_string(),
            role: flotilla::domain::models::WorkerRole::Worker,
            swarm_id: Some(swarm.id.clone()),
            ..flotilla::services::SpawnOptions::default()
        })
        .await
        .unwrap();

    let err = orchestrator
        .swarms
        .delete(&swarm.id, false)
        .await
        .expect_err("delete with live members must fail");
    assert!(matches!(
        err,
        flotilla::OrchestratorError::InvalidState { .. }
    ));

    // Force overrides the guard.
    orchestrator.swarms.delete(&swarm.id, true).await.unwrap();
    assert!(orchestrator.swarms.get(&swarm.id).await.unwrap().is_none());

    orchestrator.workers.dismiss("member", true).await.unwrap();
}
