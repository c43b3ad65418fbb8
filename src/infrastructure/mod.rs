//! Infrastructure: configuration, logging, and orchestrator assembly.

pub mod config;
pub mod logging;
pub mod setup;

pub use setup::Orchestrator;
