//! Hook domain models.
//!
//! Hooks are pre-execution validators over proposed worker operations. They
//! run in priority order; the first block short-circuits the chain.

use serde::{Deserialize, Serialize};

/// Kind of operation a hook context describes. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    BashCommand,
    FileWrite,
    FileDelete,
    GitCommit,
    GitPush,
    FileRead,
    EnvAccess,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BashCommand => "bash_command",
            Self::FileWrite => "file_write",
            Self::FileDelete => "file_delete",
            Self::GitCommit => "git_commit",
            Self::GitPush => "git_push",
            Self::FileRead => "file_read",
            Self::EnvAccess => "env_access",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bash_command" => Some(Self::BashCommand),
            "file_write" => Some(Self::FileWrite),
            "file_delete" => Some(Self::FileDelete),
            "git_commit" => Some(Self::GitCommit),
            "git_push" => Some(Self::GitPush),
            "file_read" => Some(Self::FileRead),
            "env_access" => Some(Self::EnvAccess),
            _ => None,
        }
    }
}

/// A proposed operation submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    pub operation: OperationType,
    /// Command text, for command-shaped operations
    pub command: Option<String>,
    /// File path, for file-shaped operations
    pub path: Option<String>,
    /// Handle of the worker proposing the operation
    pub worker_handle: Option<String>,
}

impl HookContext {
    pub fn command(cmd: impl Into<String>) -> Self {
        Self {
            operation: OperationType::BashCommand,
            command: Some(cmd.into()),
            path: None,
            worker_handle: None,
        }
    }

    pub fn file(operation: OperationType, path: impl Into<String>) -> Self {
        Self {
            operation,
            command: None,
            path: Some(path.into()),
            worker_handle: None,
        }
    }

    pub fn from_worker(mut self, handle: impl Into<String>) -> Self {
        self.worker_handle = Some(handle.into());
        self
    }

    /// The text a pattern-based hook should match against.
    pub fn subject_text(&self) -> &str {
        self.command
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("")
    }
}

/// Severity attached to a block or warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSeverity {
    Info,
    Warning,
    Critical,
}

/// Outcome of a single hook's validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub severity: Option<HookSeverity>,
}

impl HookVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            severity: None,
        }
    }

    pub fn block(reason: impl Into<String>, severity: HookSeverity) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            severity: Some(severity),
        }
    }
}

/// Whether blocks interrupt the action or merely warn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookMode {
    Enforce,
    Advisory,
}

impl Default for HookMode {
    fn default() -> Self {
        Self::Enforce
    }
}

/// Aggregate outcome of running the pipeline over one context.
#[derive(Debug, Clone)]
pub struct PipelineDecision {
    pub allowed: bool,
    /// Id of the hook that blocked, if any
    pub blocked_by: Option<String>,
    pub reason: Option<String>,
    /// Warnings collected in advisory mode
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_text_prefers_command() {
        let ctx = HookContext::command("rm -rf /");
        assert_eq!(ctx.subject_text(), "rm -rf /");

        let ctx = HookContext::file(OperationType::FileRead, "/etc/shadow");
        assert_eq!(ctx.subject_text(), "/etc/shadow");
    }

    #[test]
    fn test_verdicts() {
        assert!(HookVerdict::allow().allowed);
        let block = HookVerdict::block("nope", HookSeverity::Critical);
        assert!(!block.allowed);
        assert_eq!(block.severity, Some(HookSeverity::Critical));
    }
}
