//! Mail, handoffs, and the checkpoint accept/reject workflow.

mod common;

use flotilla::domain::models::{Caller, CheckpointBody, EventKind};
use flotilla::OrchestratorError;

use common::test_orchestrator;

#[tokio::test]
async fn test_mail_stays_unread_until_marked() {
    let orchestrator = test_orchestrator().await;
    let delivered = common::record_events(&orchestrator, &[EventKind::MailDelivered]);

    let id = orchestrator
        .mail
        .send("lead", "alice", "check logs", Some("logs".to_string()))
        .await
        .unwrap();
    assert_eq!(delivered.lock().unwrap().len(), 1);

    let unread = orchestrator.mail.get_unread("alice").await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].body, "check logs");

    assert!(orchestrator.mail.mark_read(id).await.unwrap());
    // Marking twice reports false.
    assert!(!orchestrator.mail.mark_read(id).await.unwrap());
    assert!(orchestrator.mail.get_unread("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mail_ordering_and_mark_all() {
    let orchestrator = test_orchestrator().await;

    for i in 0..3 {
        orchestrator
            .mail
            .send("lead", "bob", format!("message {i}"), None)
            .await
            .unwrap();
    }

    // Per-recipient total order by id.
    let unread = orchestrator.mail.get_unread("bob").await.unwrap();
    let bodies: Vec<&str> = unread.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["message 0", "message 1", "message 2"]);

    assert_eq!(orchestrator.mail.mark_all_read("bob").await.unwrap(), 3);
    assert_eq!(orchestrator.mail.mark_all_read("bob").await.unwrap(), 0);
}

#[tokio::test]
async fn test_handoff_accept_once() {
    let orchestrator = test_orchestrator().await;

    let id = orchestrator
        .mail
        .create_handoff("lead", "alice", serde_json::json!({"notes": "continue here"}))
        .await
        .unwrap();

    let pending = orchestrator.mail.get_pending_handoffs("alice").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].accepted_at.is_none());

    assert!(orchestrator.mail.accept_handoff(id).await.unwrap());
    assert!(!orchestrator.mail.accept_handoff(id).await.unwrap());
    assert!(orchestrator
        .mail
        .get_pending_handoffs("alice")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_handoff_context_size_bound() {
    let orchestrator = test_orchestrator().await;
    let huge = serde_json::json!({ "blob": "x".repeat(100 * 1024) });
    let err = orchestrator
        .mail
        .create_handoff("lead", "alice", huge)
        .await
        .expect_err("oversized handoff must be rejected");
    assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_checkpoint_terminates_at_most_once() {
    let orchestrator = test_orchestrator().await;

    let id = orchestrator
        .checkpoints
        .create("bob", "bob", None, CheckpointBody::new("implement X"))
        .await
        .unwrap();

    assert!(orchestrator.checkpoints.accept(id).await.unwrap());
    // Second accept and any reject return false and change nothing.
    assert!(!orchestrator.checkpoints.accept(id).await.unwrap());
    assert!(!orchestrator.checkpoints.reject(id).await.unwrap());

    let checkpoint = orchestrator.checkpoints.load(id).await.unwrap().unwrap();
    assert!(checkpoint.accepted_at.is_some());
    assert!(checkpoint.rejected_at.is_none());
}

#[tokio::test]
async fn test_checkpoint_goal_required() {
    let orchestrator = test_orchestrator().await;
    let err = orchestrator
        .checkpoints
        .create("bob", "bob", None, CheckpointBody::default())
        .await
        .expect_err("empty goal must be rejected");
    assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_load_latest_is_highest_id_any_status() {
    let orchestrator = test_orchestrator().await;

    let first = orchestrator
        .checkpoints
        .create("bob", "bob", None, CheckpointBody::new("first"))
        .await
        .unwrap();
    orchestrator.checkpoints.accept(first).await.unwrap();

    let second = orchestrator
        .checkpoints
        .create("bob", "bob", None, CheckpointBody::new("second"))
        .await
        .unwrap();
    assert!(second > first, "checkpoint ids must be monotonic");

    // The pending one is newer, so it wins regardless of status.
    let latest = orchestrator.checkpoints.load_latest("bob").await.unwrap().unwrap();
    assert_eq!(latest.id, second);
    assert_eq!(latest.body.goal, "second");
}

#[tokio::test]
async fn test_checkpoint_creation_is_self_only_except_leads() {
    let orchestrator = test_orchestrator().await;

    let worker = Caller::worker("alice", "s1");
    let err = orchestrator
        .checkpoints
        .create_as(&worker, "bob", "bob", None, CheckpointBody::new("goal"))
        .await
        .expect_err("worker may not checkpoint for another handle");
    assert!(matches!(err, OrchestratorError::AccessDenied { .. }));

    orchestrator
        .checkpoints
        .create_as(&worker, "alice", "bob", None, CheckpointBody::new("goal"))
        .await
        .expect("self checkpoint must pass");

    let lead = Caller::lead("boss");
    orchestrator
        .checkpoints
        .create_as(&lead, "bob", "bob", None, CheckpointBody::new("goal"))
        .await
        .expect("leads may checkpoint for anyone");
}
