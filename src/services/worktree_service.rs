//! Worktree service.
//!
//! Produces, on demand, a directory-and-branch pair that isolates a worker's
//! edits: a new branch from the configured base plus a git worktree under the
//! configured base directory, both named by a short prefix of the worker id.
//! Operations on a given worker id are serialized; distinct ids may proceed
//! concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::WorktreeConfig;

/// The pair a worker gets.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Point-in-time view of one worktree.
#[derive(Debug, Clone)]
pub struct WorktreeStatus {
    pub exists: bool,
    pub has_changes: bool,
    pub ahead: u32,
    pub behind: u32,
}

pub struct WorktreeService {
    config: WorktreeConfig,
    /// Repository the worktrees are carved out of
    repo_root: PathBuf,
    locks: Mutex<HashMap<Uuid, std::sync::Arc<tokio::sync::Mutex<()>>>>,
}

fn short_id(worker_id: Uuid) -> String {
    worker_id.simple().to_string()[..8].to_string()
}

impl WorktreeService {
    pub fn new(config: WorktreeConfig, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            repo_root: repo_root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn branch_for(&self, worker_id: Uuid) -> String {
        format!("{}{}", self.config.branch_prefix, short_id(worker_id))
    }

    pub fn path_for(&self, worker_id: Uuid) -> PathBuf {
        self.repo_root
            .join(&self.config.base_dir)
            .join(short_id(worker_id))
    }

    fn lock_for(&self, worker_id: Uuid) -> std::sync::Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(worker_id)
            .or_insert_with(|| std::sync::Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Create the worktree for a worker. Idempotent: when the path already
    /// exists the pre-existing mapping is returned.
    #[instrument(skip(self), fields(worker_id = %worker_id))]
    pub async fn create(&self, worker_id: Uuid) -> OrchestratorResult<WorktreeInfo> {
        let lock = self.lock_for(worker_id);
        let _guard = lock.lock().await;

        let branch = self.branch_for(worker_id);
        let path = self.path_for(worker_id);

        if path.exists() {
            debug!(path = %path.display(), "worktree already exists, reusing");
            return Ok(WorktreeInfo { path, branch });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OrchestratorError::WorktreeCreate {
                    worker_id: worker_id.to_string(),
                    reason: format!("failed to create base directory: {e}"),
                }
            })?;
        }

        // Refresh remote tracking. Local-only repositories have no remote;
        // that is not an error.
        if let Err(e) = self
            .git(&self.repo_root, &["fetch", &self.config.remote, "--prune"])
            .await
        {
            debug!(error = %e, "fetch failed, continuing with local refs");
        }

        match self
            .git(
                &self.repo_root,
                &["branch", &branch, &self.config.default_base_branch],
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.contains("already exists") => {
                debug!(branch = %branch, "branch already exists, reusing");
            }
            Err(e) => {
                return Err(OrchestratorError::WorktreeCreate {
                    worker_id: worker_id.to_string(),
                    reason: format!("branch creation failed: {e}"),
                });
            }
        }

        let path_str = path.to_string_lossy().to_string();
        self.git(&self.repo_root, &["worktree", "add", &path_str, &branch])
            .await
            .map_err(|e| OrchestratorError::WorktreeCreate {
                worker_id: worker_id.to_string(),
                reason: format!("worktree add failed: {e}"),
            })?;

        info!(path = %path.display(), branch = %branch, "worktree created");
        Ok(WorktreeInfo { path, branch })
    }

    /// Best-effort removal of the worktree and its branch. Never raises: a
    /// locked worktree falls back to forced directory deletion plus a prune.
    #[instrument(skip(self), fields(worker_id = %worker_id))]
    pub async fn remove(&self, worker_id: Uuid) {
        let lock = self.lock_for(worker_id);
        let _guard = lock.lock().await;

        let branch = self.branch_for(worker_id);
        let path = self.path_for(worker_id);
        let path_str = path.to_string_lossy().to_string();

        if path.exists() {
            if let Err(e) = self
                .git(&self.repo_root, &["worktree", "remove", "--force", &path_str])
                .await
            {
                warn!(error = %e, path = %path.display(), "worktree remove failed, deleting directory");
                if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                    warn!(error = %e, "directory deletion failed");
                }
                let _ = self.git(&self.repo_root, &["worktree", "prune"]).await;
            }
        }

        if let Err(e) = self.git(&self.repo_root, &["branch", "-D", &branch]).await {
            debug!(error = %e, branch = %branch, "branch deletion failed");
        }
    }

    /// Stage everything and commit. Fails with `NoChanges` on a clean tree.
    #[instrument(skip(self, message), fields(worker_id = %worker_id))]
    pub async fn commit(&self, worker_id: Uuid, message: &str) -> OrchestratorResult<String> {
        let lock = self.lock_for(worker_id);
        let _guard = lock.lock().await;

        let path = self.path_for(worker_id);
        let status = self
            .git(&path, &["status", "--porcelain"])
            .await
            .map_err(worktree_err(worker_id))?;
        if status.trim().is_empty() {
            return Err(OrchestratorError::NoChanges(worker_id.to_string()));
        }

        self.git(&path, &["add", "-A"])
            .await
            .map_err(worktree_err(worker_id))?;
        self.git(&path, &["commit", "-m", message])
            .await
            .map_err(worktree_err(worker_id))?;
        let hash = self
            .git(&path, &["rev-parse", "HEAD"])
            .await
            .map_err(worktree_err(worker_id))?;
        Ok(hash.trim().to_string())
    }

    /// Push the worker's branch to the configured remote.
    pub async fn push(&self, worker_id: Uuid) -> OrchestratorResult<()> {
        let lock = self.lock_for(worker_id);
        let _guard = lock.lock().await;

        let path = self.path_for(worker_id);
        let branch = self.branch_for(worker_id);
        self.git(&path, &["push", "-u", &self.config.remote, &branch])
            .await
            .map_err(worktree_err(worker_id))?;
        Ok(())
    }

    /// Open a pull request for the worker's branch via the `gh` CLI.
    pub async fn create_pr(
        &self,
        worker_id: Uuid,
        title: &str,
        body: &str,
    ) -> OrchestratorResult<String> {
        let path = self.path_for(worker_id);
        let output = Command::new("gh")
            .args(["pr", "create", "--title", title, "--body", body])
            .current_dir(&path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorktreeCreate {
                worker_id: worker_id.to_string(),
                reason: format!("gh invocation failed: {e}"),
            })?;
        if !output.status.success() {
            return Err(OrchestratorError::WorktreeCreate {
                worker_id: worker_id.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Status of a worker's worktree relative to the base branch.
    pub async fn get_status(&self, worker_id: Uuid) -> OrchestratorResult<WorktreeStatus> {
        let path = self.path_for(worker_id);
        if !path.exists() {
            return Ok(WorktreeStatus {
                exists: false,
                has_changes: false,
                ahead: 0,
                behind: 0,
            });
        }

        let status = self
            .git(&path, &["status", "--porcelain"])
            .await
            .map_err(worktree_err(worker_id))?;

        let range = format!("{}...HEAD", self.config.default_base_branch);
        let (behind, ahead) = match self
            .git(&path, &["rev-list", "--left-right", "--count", &range])
            .await
        {
            Ok(counts) => {
                let mut parts = counts.split_whitespace();
                let behind = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let ahead = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                (behind, ahead)
            }
            Err(_) => (0, 0),
        };

        Ok(WorktreeStatus {
            exists: true,
            has_changes: !status.trim().is_empty(),
            ahead,
            behind,
        })
    }

    /// All registered worktrees of the repository, as (path, branch) pairs.
    pub async fn list_all(&self) -> OrchestratorResult<Vec<(PathBuf, String)>> {
        let raw = self
            .git(&self.repo_root, &["worktree", "list", "--porcelain"])
            .await
            .map_err(OrchestratorError::StorageIo)?;

        let mut result = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        for line in raw.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch) = line.strip_prefix("branch ") {
                if let Some(path) = current_path.take() {
                    let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
                    result.push((path, branch.to_string()));
                }
            }
        }
        Ok(result)
    }

    /// Drop stale worktree registrations.
    pub async fn prune(&self) -> OrchestratorResult<()> {
        self.git(&self.repo_root, &["worktree", "prune"])
            .await
            .map_err(OrchestratorError::StorageIo)?;
        Ok(())
    }

    /// Remove worktrees under the base directory that belong to no active
    /// worker. Used at startup to clear leftovers from dead fleets.
    pub async fn cleanup_orphaned(&self, active_ids: &[Uuid]) -> OrchestratorResult<u32> {
        let base = self.repo_root.join(&self.config.base_dir);
        if !base.exists() {
            return Ok(0);
        }
        let active: Vec<String> = active_ids.iter().map(|id| short_id(*id)).collect();

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&base)
            .await
            .map_err(|e| OrchestratorError::StorageIo(e.to_string()))?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(OrchestratorError::StorageIo(e.to_string())),
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if active.iter().any(|s| *s == name) {
                continue;
            }
            let path_str = entry.path().to_string_lossy().to_string();
            info!(path = %path_str, "removing orphaned worktree");
            if self
                .git(&self.repo_root, &["worktree", "remove", "--force", &path_str])
                .await
                .is_err()
            {
                let _ = tokio::fs::remove_dir_all(entry.path()).await;
                let _ = self.git(&self.repo_root, &["worktree", "prune"]).await;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Run a git command, returning stdout on success and stderr text on
    /// failure.
    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run git: {e}"))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

fn worktree_err(worker_id: Uuid) -> impl Fn(String) -> OrchestratorError {
    move |reason| OrchestratorError::WorktreeCreate {
        worker_id: worker_id.to_string(),
        reason,
    }
}
