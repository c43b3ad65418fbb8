//! Flotilla binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use flotilla::domain::models::OrchestratorConfig;
use flotilla::infrastructure::config::ConfigLoader;
use flotilla::infrastructure::{logging, Orchestrator};

use flotilla::cli::{self, Cli, Command};

const DEFAULT_CONFIG: &str = "\
# Flotilla configuration. Values omitted here fall back to built-in defaults;
# FLOTILLA_* environment variables override everything.
max_workers: 100
max_depth: 3
worktree:
  enabled: true
  base_dir: .flotilla/worktrees
  branch_prefix: flotilla/
  default_base_branch: main
database:
  path: .flotilla/flotilla.db
logging:
  level: info
  format: pretty
";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if matches!(args.command, Command::Init) {
        return init_project();
    }

    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logging_guard = logging::init(&config.logging)?;

    let cwd = std::env::current_dir().context("cannot determine working directory")?;

    match args.command {
        Command::Init => unreachable!("handled above"),
        Command::Serve => serve(config, cwd).await,
        other => {
            let orchestrator = Orchestrator::build(config, cwd).await?;
            cli::dispatch(&orchestrator, other).await
        }
    }
}

fn init_project() -> Result<()> {
    std::fs::create_dir_all(".flotilla/worktrees").context("failed to create .flotilla")?;
    let config_path = std::path::Path::new(".flotilla/config.yaml");
    if config_path.exists() {
        println!(".flotilla/config.yaml already exists, leaving it alone");
    } else {
        std::fs::write(config_path, DEFAULT_CONFIG).context("failed to write config")?;
        println!("wrote .flotilla/config.yaml");
    }
    Ok(())
}

async fn serve(config: OrchestratorConfig, cwd: std::path::PathBuf) -> Result<()> {
    let orchestrator = Orchestrator::build(config, cwd).await?;
    let cancel = orchestrator.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            cancel.cancel();
        }
    });

    info!("flotilla serving");
    orchestrator.run().await?;
    info!("flotilla stopped");
    Ok(())
}
