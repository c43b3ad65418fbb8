//! Blackboard fan-out, visibility, read tracking, ordering, and archival.

mod common;

use flotilla::domain::models::{
    BlackboardFilter, Caller, MessagePriority, MessageType,
};
use flotilla::services::PostOptions;
use flotilla::OrchestratorError;

use common::test_orchestrator;

#[tokio::test]
async fn test_broadcast_fan_out_and_read_tracking() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    orchestrator
        .blackboard
        .post(
            &swarm.id,
            "w1",
            MessageType::Status,
            serde_json::json!({"x": 1}),
            PostOptions::default(),
        )
        .await
        .expect("post failed");

    // First unread read as w2 returns exactly the one message.
    let messages = orchestrator
        .blackboard
        .read(
            &swarm.id,
            BlackboardFilter {
                unread_only: true,
                reader_handle: Some("w2".to_string()),
                ..BlackboardFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, serde_json::json!({"x": 1}));

    orchestrator
        .blackboard
        .mark_read(&[messages[0].id], "w2")
        .await
        .unwrap();

    // Second unread read is empty.
    let messages = orchestrator
        .blackboard
        .read(
            &swarm.id,
            BlackboardFilter {
                unread_only: true,
                reader_handle: Some("w2".to_string()),
                ..BlackboardFilter::default()
            },
        )
        .await
        .unwrap();
    assert!(messages.is_empty());

    // w2's read bookkeeping does not hide the message from w1.
    let for_w1 = orchestrator
        .blackboard
        .read(
            &swarm.id,
            BlackboardFilter {
                unread_only: true,
                reader_handle: Some("w1".to_string()),
                ..BlackboardFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(for_w1.len(), 1);
}

#[tokio::test]
async fn test_targeted_visibility() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    orchestrator
        .blackboard
        .post(
            &swarm.id,
            "sender",
            MessageType::Request,
            serde_json::json!({"ask": "review"}),
            PostOptions {
                target_handle: Some("target".to_string()),
                ..PostOptions::default()
            },
        )
        .await
        .unwrap();

    let read_as = |reader: &str| {
        let orchestrator = &orchestrator;
        let swarm_id = swarm.id.clone();
        let reader = reader.to_string();
        async move {
            orchestrator
                .blackboard
                .read(
                    &swarm_id,
                    BlackboardFilter {
                        reader_handle: Some(reader),
                        ..BlackboardFilter::default()
                    },
                )
                .await
                .unwrap()
        }
    };

    assert_eq!(read_as("target").await.len(), 1, "target must see it");
    assert_eq!(read_as("sender").await.len(), 1, "sender keeps its own record");
    assert!(read_as("bystander").await.is_empty(), "others must not see it");
}

#[tokio::test]
async fn test_priority_then_recency_ordering() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    for (priority, tag) in [
        (MessagePriority::Low, "low"),
        (MessagePriority::Critical, "critical"),
        (MessagePriority::Normal, "normal-old"),
        (MessagePriority::Normal, "normal-new"),
    ] {
        orchestrator
            .blackboard
            .post(
                &swarm.id,
                "w1",
                MessageType::Status,
                serde_json::json!({ "tag": tag }),
                PostOptions {
                    priority: Some(priority),
                    ..PostOptions::default()
                },
            )
            .await
            .unwrap();
    }

    let messages = orchestrator
        .blackboard
        .read(&swarm.id, BlackboardFilter::default())
        .await
        .unwrap();
    let tags: Vec<&str> = messages
        .iter()
        .map(|m| m.payload["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["critical", "normal-new", "normal-old", "low"]);
}

#[tokio::test]
async fn test_subscribe_is_a_bounded_catch_up() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    for i in 0..5 {
        orchestrator
            .blackboard
            .post(
                &swarm.id,
                "w1",
                MessageType::Status,
                serde_json::json!({ "seq": i }),
                PostOptions::default(),
            )
            .await
            .unwrap();
    }

    let first = orchestrator.blackboard.subscribe(&swarm.id, 0).await.unwrap();
    assert_eq!(first.messages.len(), 5);
    // Append-only suffix: ids strictly increase.
    let ids: Vec<i64> = first.messages.iter().map(|m| m.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    let again = orchestrator
        .blackboard
        .subscribe(&swarm.id, first.new_last_seen_id)
        .await
        .unwrap();
    assert!(again.messages.is_empty());
    assert_eq!(again.new_last_seen_id, first.new_last_seen_id);
}

#[tokio::test]
async fn test_archive_old_hides_messages() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    orchestrator
        .blackboard
        .post(
            &swarm.id,
            "w1",
            MessageType::Status,
            serde_json::json!({"old": true}),
            PostOptions::default(),
        )
        .await
        .unwrap();

    // Everything older than 0ms is archived.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let archived = orchestrator.blackboard.archive_old(&swarm.id, 0).await.unwrap();
    assert_eq!(archived, 1);

    let messages = orchestrator
        .blackboard
        .read(&swarm.id, BlackboardFilter::default())
        .await
        .unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_unread_count() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    for _ in 0..3 {
        orchestrator
            .blackboard
            .post(
                &swarm.id,
                "w1",
                MessageType::Status,
                serde_json::json!({}),
                PostOptions::default(),
            )
            .await
            .unwrap();
    }

    assert_eq!(
        orchestrator.blackboard.unread_count(&swarm.id, "w2").await.unwrap(),
        3
    );

    let messages = orchestrator
        .blackboard
        .read(&swarm.id, BlackboardFilter::default())
        .await
        .unwrap();
    orchestrator
        .blackboard
        .mark_read(&[messages[0].id], "w2")
        .await
        .unwrap();
    assert_eq!(
        orchestrator.blackboard.unread_count(&swarm.id, "w2").await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_within_swarm_access_enforced() {
    let orchestrator = test_orchestrator().await;
    let swarm = orchestrator.swarms.create("s1", 10).await.unwrap();

    let outsider = Caller::worker("intruder", "some-other-swarm");
    let err = orchestrator
        .blackboard
        .post_as(
            &outsider,
            &swarm.id,
            MessageType::Status,
            serde_json::json!({}),
            PostOptions::default(),
        )
        .await
        .expect_err("cross-swarm post must be denied");
    assert!(matches!(err, OrchestratorError::AccessDenied { .. }));

    let member = Caller::worker("member", swarm.id.clone());
    orchestrator
        .blackboard
        .post_as(
            &member,
            &swarm.id,
            MessageType::Status,
            serde_json::json!({}),
            PostOptions::default(),
        )
        .await
        .expect("member post must pass");

    // Team leads may reach any swarm.
    let lead = Caller::lead("boss");
    let messages = orchestrator
        .blackboard
        .read_as(&lead, &swarm.id, BlackboardFilter::default())
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}
