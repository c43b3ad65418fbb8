//! Hook pipeline.
//!
//! A pre-execution filter chain for dangerous worker actions observed in the
//! output stream or submitted for explicit pre-checks. Hooks run in priority
//! descending order; the first block short-circuits. In enforce mode a block
//! becomes a `SafetyBlocked` error; in advisory mode blocks are collected as
//! warnings and never stop the action.

use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    HookContext, HookMode, HookSeverity, HookVerdict, OperationType, OrchestratorEvent,
    PipelineDecision,
};

use super::event_bus::EventBus;

/// A single pre-execution validator.
pub trait Hook: Send + Sync {
    fn id(&self) -> &str;
    fn priority(&self) -> i32;
    fn enabled(&self) -> bool {
        true
    }
    fn validate(&self, context: &HookContext) -> HookVerdict;
}

/// A hook that blocks when a regex matches the context's subject text.
pub struct RegexHook {
    id: String,
    priority: i32,
    enabled: bool,
    /// Operations this hook applies to; empty means all
    operations: Vec<OperationType>,
    pattern: Regex,
    reason: String,
    severity: HookSeverity,
}

impl RegexHook {
    pub fn new(
        id: impl Into<String>,
        priority: i32,
        operations: Vec<OperationType>,
        pattern: Regex,
        reason: impl Into<String>,
        severity: HookSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            enabled: true,
            operations,
            pattern,
            reason: reason.into(),
            severity,
        }
    }
}

impl Hook for RegexHook {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self, context: &HookContext) -> HookVerdict {
        if !self.operations.is_empty() && !self.operations.contains(&context.operation) {
            return HookVerdict::allow();
        }
        if self.pattern.is_match(context.subject_text()) {
            HookVerdict::block(self.reason.clone(), self.severity)
        } else {
            HookVerdict::allow()
        }
    }
}

pub struct HookPipeline {
    mode: HookMode,
    event_bus: Arc<EventBus>,
    /// Kept sorted by priority descending; ties keep registration order
    hooks: RwLock<Vec<Arc<dyn Hook>>>,
}

impl HookPipeline {
    pub fn new(mode: HookMode, event_bus: Arc<EventBus>) -> Self {
        Self {
            mode,
            event_bus,
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Pipeline seeded with the default safety rules.
    pub fn with_default_hooks(mode: HookMode, event_bus: Arc<EventBus>) -> Self {
        let pipeline = Self::new(mode, event_bus);
        for hook in default_hooks() {
            pipeline.register(hook);
        }
        pipeline
    }

    pub fn register(&self, hook: Arc<dyn Hook>) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(hook);
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn mode(&self) -> HookMode {
        self.mode
    }

    /// Run the chain over a proposed operation.
    pub fn check(&self, context: &HookContext) -> PipelineDecision {
        let hooks: Vec<Arc<dyn Hook>> = {
            let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
            hooks.to_vec()
        };

        let mut warnings = Vec::new();
        for hook in hooks {
            if !hook.enabled() {
                continue;
            }
            let verdict = hook.validate(context);
            if verdict.allowed {
                continue;
            }
            let reason = verdict
                .reason
                .unwrap_or_else(|| "blocked without reason".to_string());
            self.event_bus.emit(OrchestratorEvent::AuditBlocked {
                hook_id: hook.id().to_string(),
                handle: context.worker_handle.clone(),
                reason: reason.clone(),
            });
            match self.mode {
                HookMode::Enforce => {
                    debug!(hook = hook.id(), %reason, "hook blocked operation");
                    return PipelineDecision {
                        allowed: false,
                        blocked_by: Some(hook.id().to_string()),
                        reason: Some(reason),
                        warnings,
                    };
                }
                HookMode::Advisory => {
                    warn!(hook = hook.id(), %reason, "hook warning (advisory mode)");
                    warnings.push(format!("{}: {reason}", hook.id()));
                }
            }
        }

        PipelineDecision {
            allowed: true,
            blocked_by: None,
            reason: None,
            warnings,
        }
    }

    /// Check and surface a block as `SafetyBlocked` in enforce mode.
    pub fn validate(&self, context: &HookContext) -> OrchestratorResult<PipelineDecision> {
        let decision = self.check(context);
        if !decision.allowed {
            return Err(OrchestratorError::SafetyBlocked {
                hook_id: decision.blocked_by.clone().unwrap_or_default(),
                reason: decision.reason.clone().unwrap_or_default(),
            });
        }
        Ok(decision)
    }
}

/// The seeded safety rules.
pub fn default_hooks() -> Vec<Arc<dyn Hook>> {
    let command_ops = vec![OperationType::BashCommand];
    let read_ops = vec![OperationType::FileRead, OperationType::BashCommand];
    vec![
        Arc::new(RegexHook::new(
            "block-recursive-root-delete",
            100,
            vec![OperationType::BashCommand, OperationType::FileDelete],
            Regex::new(r"rm\s+-\w*[rR]\w*\s+(/|~|\$HOME)(\s|$|\*)").expect("static pattern"),
            "recursive delete of a root-level path",
            HookSeverity::Critical,
        )),
        Arc::new(RegexHook::new(
            "block-fork-bomb",
            95,
            command_ops.clone(),
            Regex::new(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:").expect("static pattern"),
            "fork bomb pattern",
            HookSeverity::Critical,
        )),
        Arc::new(RegexHook::new(
            "block-block-device-write",
            90,
            command_ops,
            Regex::new(r"(dd\s+[^|]*of=/dev/(sd|hd|nvme|vd)|>\s*/dev/(sd|hd|nvme|vd)|mkfs\.\w+\s+/dev/)")
                .expect("static pattern"),
            "write to a block device",
            HookSeverity::Critical,
        )),
        Arc::new(RegexHook::new(
            "block-secret-read",
            80,
            read_ops,
            Regex::new(r"(\.ssh/id_[a-z0-9]+|/etc/shadow|\.aws/credentials|\.netrc|(^|/)\.env$)")
                .expect("static pattern"),
            "read of a well-known secret file",
            HookSeverity::Warning,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(mode: HookMode) -> HookPipeline {
        HookPipeline::with_default_hooks(mode, Arc::new(EventBus::new()))
    }

    #[test]
    fn test_root_delete_blocked() {
        let p = pipeline(HookMode::Enforce);
        let decision = p.check(&HookContext::command("rm -rf /"));
        assert!(!decision.allowed);
        assert_eq!(decision.blocked_by.as_deref(), Some("block-recursive-root-delete"));
    }

    #[test]
    fn test_scoped_delete_allowed() {
        let p = pipeline(HookMode::Enforce);
        assert!(p.check(&HookContext::command("rm -rf ./target")).allowed);
        assert!(p.check(&HookContext::command("rm -rf /tmp/scratch")).allowed);
    }

    #[test]
    fn test_fork_bomb_blocked() {
        let p = pipeline(HookMode::Enforce);
        let decision = p.check(&HookContext::command(":(){ :|:& };:"));
        assert!(!decision.allowed);
        assert_eq!(decision.blocked_by.as_deref(), Some("block-fork-bomb"));
    }

    #[test]
    fn test_block_device_write_blocked() {
        let p = pipeline(HookMode::Enforce);
        assert!(!p.check(&HookContext::command("dd if=/dev/zero of=/dev/sda")).allowed);
        assert!(!p.check(&HookContext::command("mkfs.ext4 /dev/sdb1")).allowed);
    }

    #[test]
    fn test_secret_read_blocked() {
        let p = pipeline(HookMode::Enforce);
        let ctx = HookContext::file(OperationType::FileRead, "/home/user/.ssh/id_rsa");
        assert!(!p.check(&ctx).allowed);
        let ctx = HookContext::file(OperationType::FileRead, "/etc/hostname");
        assert!(p.check(&ctx).allowed);
    }

    #[test]
    fn test_advisory_mode_collects_warnings() {
        let p = pipeline(HookMode::Advisory);
        let decision = p.check(&HookContext::command("rm -rf /"));
        assert!(decision.allowed);
        assert_eq!(decision.warnings.len(), 1);
        assert!(decision.warnings[0].contains("block-recursive-root-delete"));
    }

    #[test]
    fn test_short_circuit_skips_lower_priority() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct Recording {
            invoked: Arc<AtomicBool>,
        }
        impl Hook for Recording {
            fn id(&self) -> &str {
                "recording"
            }
            fn priority(&self) -> i32 {
                10
            }
            fn validate(&self, _: &HookContext) -> HookVerdict {
                self.invoked.store(true, Ordering::SeqCst);
                HookVerdict::allow()
            }
        }

        let p = pipeline(HookMode::Enforce);
        let invoked = Arc::new(AtomicBool::new(false));
        p.register(Arc::new(Recording {
            invoked: Arc::clone(&invoked),
        }));

        let decision = p.check(&HookContext::command("rm -rf /"));
        assert!(!decision.allowed);
        assert!(!invoked.load(Ordering::SeqCst), "lower-priority hook ran after a block");
    }

    #[test]
    fn test_validate_surfaces_safety_error() {
        let p = pipeline(HookMode::Enforce);
        let err = p.validate(&HookContext::command("rm -rf /")).unwrap_err();
        match err {
            OrchestratorError::SafetyBlocked { hook_id, .. } => {
                assert_eq!(hook_id, "block-recursive-root-delete");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
