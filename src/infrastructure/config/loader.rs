use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::OrchestratorConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_workers: {0}. Must be at least 1")]
    InvalidMaxWorkers(usize),

    #[error("Invalid max_depth: {0}. Must be at least 1")]
    InvalidMaxDepth(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Worker command cannot be empty")]
    EmptyWorkerCommand,

    #[error("Invalid heartbeat configuration: interval {0}ms must not exceed stale threshold {1}ms")]
    InvalidHeartbeat(u64, u64),

    #[error("Invalid pattern for {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.flotilla/config.yaml` (project config, created by init)
    /// 3. `.flotilla/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`FLOTILLA_*` prefix)
    ///
    /// Configuration is always project-local so multiple fleets can run on
    /// one machine against different repositories.
    pub fn load() -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(".flotilla/config.yaml"))
            .merge(Yaml::file(".flotilla/local.yaml"))
            .merge(Env::prefixed("FLOTILLA_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<OrchestratorConfig> {
        let config: OrchestratorConfig = Figment::new()
            .merge(Serialized::defaults(OrchestratorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        if config.max_workers == 0 {
            return Err(ConfigError::InvalidMaxWorkers(config.max_workers));
        }
        if config.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth(config.max_depth));
        }

        if config.database.backend != "sqlite" {
            return Err(ConfigError::ValidationFailed(format!(
                "unknown storage backend '{}'; only 'sqlite' ships in-tree",
                config.database.backend
            )));
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.worker.command.is_empty() {
            return Err(ConfigError::EmptyWorkerCommand);
        }

        if config.heartbeat.interval_ms > config.heartbeat.stale_threshold_ms {
            return Err(ConfigError::InvalidHeartbeat(
                config.heartbeat.interval_ms,
                config.heartbeat.stale_threshold_ms,
            ));
        }

        for (field, pattern) in [
            ("worker.ready_pattern", &config.worker.ready_pattern),
            ("worker.success_pattern", &config.worker.success_pattern),
            (
                "worker.idle_prompt_pattern",
                &config.worker.idle_prompt_pattern,
            ),
        ] {
            if let Err(source) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidPattern { field, source });
            }
        }

        if config.worktree.enabled && config.worktree.branch_prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "worktree.branch_prefix cannot be empty when worktrees are enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = OrchestratorConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = OrchestratorConfig::default();
        config.max_workers = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxWorkers(0))
        ));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = OrchestratorConfig::default();
        config.logging.level = "loud".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = OrchestratorConfig::default();
        config.worker.success_pattern = "(unclosed".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_heartbeat_interval_bound() {
        let mut config = OrchestratorConfig::default();
        config.heartbeat.interval_ms = 500_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidHeartbeat(_, _))
        ));
    }
}
