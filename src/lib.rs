//! Flotilla: an agent-fleet orchestrator.
//!
//! A persistent server that spawns, supervises, and coordinates many
//! long-running interactive coding-agent subprocesses working in parallel on
//! one or more repositories:
//! - Worker lifecycle with heartbeats, crash recovery, and dismissal
//! - Per-worker isolated git worktrees on dedicated branches
//! - Wave scheduling: dependency-ordered phases with bounded parallelism
//! - Durable blackboard pub/sub and directed mail between workers
//! - Checkpoints with an accept/reject workflow feeding recovery prompts
//! - SQLite storage with WAL mode behind pluggable repository ports

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{OrchestratorError, OrchestratorResult};
pub use infrastructure::Orchestrator;
