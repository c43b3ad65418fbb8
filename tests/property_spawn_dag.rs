//! Property tests for spawn-queue DAG integrity: however dependencies are
//! declared, the queue never holds a cycle, and an edge that would close one
//! is rejected exactly when local reachability says it should be.

mod common;

use std::collections::HashSet;

use proptest::prelude::*;

use flotilla::domain::models::WorkerRole;
use flotilla::services::QueueSpawnOptions;
use flotilla::OrchestratorError;

/// Does `to` transitively depend on `from`, per the bitmask model?
/// `masks[i]` bit `j` set means item `i+1` depends on item `j`.
fn reaches(masks: &[u8], from: usize, to: usize) -> bool {
    let mut frontier = vec![to];
    let mut seen = HashSet::new();
    while let Some(node) = frontier.pop() {
        if node == from {
            return true;
        }
        if !seen.insert(node) || node == 0 {
            continue;
        }
        let mask = masks[node - 1];
        for dep in 0..node.min(8) {
            if mask & (1 << dep) != 0 {
                frontier.push(dep);
            }
        }
    }
    false
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_queue_never_contains_cycle(
        masks in proptest::collection::vec(any::<u8>(), 1..6),
        edge_from in 0..6usize,
        edge_to in 0..6usize,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let orchestrator = common::test_orchestrator().await;
            let item_count = masks.len() + 1;

            // Build a DAG: each item depends on a subset of earlier items.
            let mut ids = Vec::new();
            for i in 0..item_count {
                let deps: Vec<uuid::Uuid> = if i == 0 {
                    Vec::new()
                } else {
                    (0..i.min(8))
                        .filter(|j| masks[i - 1] & (1 << j) != 0)
                        .map(|j| ids[j])
                        .collect()
                };
                let id = orchestrator
                    .scheduler
                    .queue_spawn(
                        "prop",
                        WorkerRole::Worker,
                        1,
                        &format!("item {i}"),
                        QueueSpawnOptions {
                            depends_on: deps,
                            ..QueueSpawnOptions::default()
                        },
                    )
                    .await
                    .expect("forward-only dependencies can never cycle");
                ids.push(id);
            }

            // Try one extra edge. It closes a cycle exactly when the target
            // already reaches the source (or they are the same item).
            let from = edge_from % item_count;
            let to = edge_to % item_count;
            let expect_cycle = from == to || reaches(&masks, from, to);
            let result = orchestrator.scheduler.add_dependency(ids[from], ids[to]).await;
            match (expect_cycle, result) {
                (true, Err(OrchestratorError::DependencyCycle(_))) => {}
                (false, Ok(())) => {}
                (expected, other) => panic!(
                    "edge {from}->{to}: expected cycle={expected}, got {other:?}"
                ),
            }

            // Whatever happened, the stored queue still topologically sorts.
            let items = orchestrator.scheduler.list(None).await.unwrap();
            let mut placed: HashSet<uuid::Uuid> = HashSet::new();
            let mut remaining = items;
            loop {
                let before = remaining.len();
                remaining.retain(|item| {
                    if item.depends_on.iter().all(|d| placed.contains(d)) {
                        placed.insert(item.id);
                        false
                    } else {
                        true
                    }
                });
                if remaining.is_empty() {
                    break;
                }
                assert!(remaining.len() < before, "stored queue contains a cycle");
            }
        });
    }
}
