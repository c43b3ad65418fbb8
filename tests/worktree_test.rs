//! Worktree isolation over a real git repository.

mod common;

use std::path::Path;

use flotilla::domain::models::{WorkerRole, WorkerStatus, WorktreeConfig};
use flotilla::services::{SpawnOptions, WorktreeService};
use flotilla::{Orchestrator, OrchestratorError};
use uuid::Uuid;

async fn git(dir: &Path, args: &[&str]) {
    let status = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .expect("git invocation failed");
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

async fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]).await;
    git(dir, &["config", "user.email", "fleet@example.com"]).await;
    git(dir, &["config", "user.name", "Fleet"]).await;
    tokio::fs::write(dir.join("README.md"), "# fixture\n").await.unwrap();
    git(dir, &["add", "-A"]).await;
    git(dir, &["commit", "-m", "initial"]).await;
}

fn service(repo: &Path) -> WorktreeService {
    WorktreeService::new(WorktreeConfig::default(), repo)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let worktrees = service(dir.path());
    let worker_id = Uuid::new_v4();

    let info = worktrees.create(worker_id).await.expect("create failed");
    assert!(info.path.exists());
    assert!(info.branch.starts_with("flotilla/"));
    assert!(info.path.join("README.md").exists());

    let again = worktrees.create(worker_id).await.expect("second create failed");
    assert_eq!(again.path, info.path);
    assert_eq!(again.branch, info.branch);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_workers_never_share_a_worktree() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let worktrees = service(dir.path());

    let first = worktrees.create(Uuid::new_v4()).await.unwrap();
    let second = worktrees.create(Uuid::new_v4()).await.unwrap();
    assert_ne!(first.path, second.path);
    assert_ne!(first.branch, second.branch);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commit_and_status() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let worktrees = service(dir.path());
    let worker_id = Uuid::new_v4();

    let info = worktrees.create(worker_id).await.unwrap();

    // Clean tree refuses to commit.
    let err = worktrees
        .commit(worker_id, "empty")
        .await
        .expect_err("clean tree must refuse to commit");
    assert!(matches!(err, OrchestratorError::NoChanges(_)));

    tokio::fs::write(info.path.join("work.txt"), "did the thing\n")
        .await
        .unwrap();
    let status = worktrees.get_status(worker_id).await.unwrap();
    assert!(status.exists);
    assert!(status.has_changes);

    let hash = worktrees.commit(worker_id, "do the thing").await.unwrap();
    assert_eq!(hash.len(), 40);

    let status = worktrees.get_status(worker_id).await.unwrap();
    assert!(!status.has_changes);
    assert_eq!(status.ahead, 1);
    assert_eq!(status.behind, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remove_never_raises() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let worktrees = service(dir.path());
    let worker_id = Uuid::new_v4();

    let info = worktrees.create(worker_id).await.unwrap();
    assert!(info.path.exists());

    worktrees.remove(worker_id).await;
    assert!(!info.path.exists());

    // Removing a worktree that is already gone is fine.
    worktrees.remove(worker_id).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cleanup_orphaned() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;
    let worktrees = service(dir.path());

    let keep = Uuid::new_v4();
    let orphan = Uuid::new_v4();
    let kept_info = worktrees.create(keep).await.unwrap();
    let orphan_info = worktrees.create(orphan).await.unwrap();

    let removed = worktrees.cleanup_orphaned(&[keep]).await.unwrap();
    assert_eq!(removed, 1);
    assert!(kept_info.path.exists());
    assert!(!orphan_info.path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawned_worker_gets_isolated_worktree() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path()).await;

    let mut config = common::test_config();
    config.worktree.enabled = true;
    let orchestrator = Orchestrator::build_with_url(config, "sqlite::memory:", dir.path())
        .await
        .expect("failed to build orchestrator");

    let worker = orchestrator
        .workers
        .spawn(SpawnOptions {
            handle: "alice".to_string(),
            role: WorkerRole::Worker,
            prompt: Some("hello".to_string()),
            ..SpawnOptions::default()
        })
        .await
        .expect("spawn failed");

    let branch = worker.branch.clone().expect("worker must have a branch");
    assert!(branch.starts_with("flotilla/"));
    let worktree_path = worker.worktree_path.clone().expect("worker must have a worktree");
    assert!(Path::new(&worktree_path).exists());
    assert_eq!(worker.working_dir, worktree_path);

    orchestrator.workers.dismiss("alice", true).await.unwrap();

    // The worktree is gone but the record remains.
    assert!(!Path::new(&worktree_path).exists());
    let stored = orchestrator.workers.get("alice").await.unwrap().unwrap();
    assert_eq!(stored.status, WorkerStatus::Dismissed);
    assert!(stored.dismissed_at.is_some());
}
