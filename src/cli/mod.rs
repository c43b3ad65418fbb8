//! Command-line interface.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::models::{
    BlackboardFilter, CheckpointBody, MessagePriority, MessageType, SpawnStatus, WorkerRole,
    WorkerStatus,
};
use crate::domain::ports::WorkerFilter;
use crate::infrastructure::Orchestrator;
use crate::services::{PostOptions, QueueSpawnOptions, SpawnOptions};

#[derive(Parser)]
#[command(name = "flotilla", version, about = "Agent-fleet orchestrator")]
pub struct Cli {
    /// Configuration file override
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the .flotilla directory and a default config
    Init,
    /// Run the orchestrator: recovery, heartbeat sweep, spawn scheduling
    Serve,
    /// Worker lifecycle
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Swarm management
    #[command(subcommand)]
    Swarm(SwarmCommand),
    /// Directed mail between workers
    #[command(subcommand)]
    Mail(MailCommand),
    /// Swarm blackboard
    #[command(subcommand)]
    Board(BoardCommand),
    /// Spawn queue
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),
}

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// Spawn a worker
    Spawn {
        #[arg(long)]
        handle: String,
        #[arg(long, default_value = "worker")]
        role: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        swarm: Option<String>,
        /// Skip worktree creation for this worker
        #[arg(long)]
        no_worktree: bool,
    },
    /// List workers
    List {
        /// Include dismissed workers
        #[arg(long)]
        all: bool,
        #[arg(long)]
        status: Option<String>,
    },
    /// Dismiss a worker
    Dismiss {
        handle: String,
        /// Skip the graceful terminate and kill immediately
        #[arg(long)]
        force: bool,
    },
    /// Record a heartbeat for a worker
    Heartbeat { handle: String },
}

#[derive(Subcommand)]
pub enum SwarmCommand {
    Create {
        name: String,
        #[arg(long, default_value_t = 10)]
        max_agents: u32,
    },
    List,
    Delete {
        id: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum MailCommand {
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: Option<String>,
        body: String,
    },
    /// List mail for a handle
    List {
        handle: String,
        /// Include read mail
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum BoardCommand {
    Post {
        #[arg(long)]
        swarm: String,
        #[arg(long)]
        sender: String,
        #[arg(long, default_value = "status")]
        message_type: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
        /// JSON payload
        payload: String,
    },
    Read {
        #[arg(long)]
        swarm: String,
        #[arg(long)]
        reader: Option<String>,
        #[arg(long)]
        unread_only: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueCommand {
    Add {
        #[arg(long)]
        requester: String,
        #[arg(long, default_value = "worker")]
        role: String,
        #[arg(long, default_value_t = 1)]
        depth: u32,
        #[arg(long, default_value_t = 1)]
        priority: u8,
        #[arg(long)]
        swarm: Option<String>,
        task: String,
    },
    List {
        #[arg(long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Create a checkpoint for a handle
    Create {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        goal: String,
    },
    /// List checkpoints addressed to a handle
    List { handle: String },
    Accept { id: i64 },
    Reject { id: i64 },
}

fn parse_role(s: &str) -> Result<WorkerRole> {
    WorkerRole::parse_str(s).with_context(|| format!("unknown role '{s}'"))
}

pub async fn dispatch(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Init | Command::Serve => {
            // Handled in main before the orchestrator exists / runs.
            Ok(())
        }
        Command::Worker(cmd) => worker_command(orchestrator, cmd).await,
        Command::Swarm(cmd) => swarm_command(orchestrator, cmd).await,
        Command::Mail(cmd) => mail_command(orchestrator, cmd).await,
        Command::Board(cmd) => board_command(orchestrator, cmd).await,
        Command::Queue(cmd) => queue_command(orchestrator, cmd).await,
        Command::Checkpoint(cmd) => checkpoint_command(orchestrator, cmd).await,
    }
}

async fn worker_command(orchestrator: &Orchestrator, cmd: WorkerCommand) -> Result<()> {
    match cmd {
        WorkerCommand::Spawn {
            handle,
            role,
            prompt,
            swarm,
            no_worktree,
        } => {
            let worker = orchestrator
                .workers
                .spawn(SpawnOptions {
                    handle,
                    role: parse_role(&role)?,
                    prompt,
                    swarm_id: swarm,
                    worktree: if no_worktree { Some(false) } else { None },
                    ..SpawnOptions::default()
                })
                .await?;
            println!("spawned {} ({})", worker.handle, worker.id);
            Ok(())
        }
        WorkerCommand::List { all, status } => {
            let status = match status {
                Some(s) => Some(
                    WorkerStatus::parse_str(&s).with_context(|| format!("unknown status '{s}'"))?,
                ),
                None => None,
            };
            let workers = orchestrator
                .workers
                .list(WorkerFilter {
                    include_dismissed: all,
                    status,
                    ..WorkerFilter::default()
                })
                .await?;

            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec![
                "handle", "role", "status", "pid", "restarts", "swarm", "branch",
            ]);
            for w in workers {
                table.add_row(vec![
                    w.handle.clone(),
                    w.role.to_string(),
                    w.status.to_string(),
                    w.pid.map(|p| p.to_string()).unwrap_or_default(),
                    w.restart_count.to_string(),
                    w.swarm_id.clone().unwrap_or_default(),
                    w.branch.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        WorkerCommand::Dismiss { handle, force } => {
            orchestrator.workers.dismiss(&handle, !force).await?;
            println!("dismissed {handle}");
            Ok(())
        }
        WorkerCommand::Heartbeat { handle } => {
            orchestrator.workers.heartbeat(&handle).await?;
            Ok(())
        }
    }
}

async fn swarm_command(orchestrator: &Orchestrator, cmd: SwarmCommand) -> Result<()> {
    match cmd {
        SwarmCommand::Create { name, max_agents } => {
            let swarm = orchestrator.swarms.create(&name, max_agents).await?;
            println!("created swarm {} ({})", swarm.name, swarm.id);
            Ok(())
        }
        SwarmCommand::List => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["id", "name", "max agents", "created"]);
            for s in orchestrator.swarms.list().await? {
                table.add_row(vec![
                    s.id.clone(),
                    s.name.clone(),
                    s.max_agents.to_string(),
                    s.created_at.to_rfc3339(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        SwarmCommand::Delete { id, force } => {
            orchestrator.swarms.delete(&id, force).await?;
            println!("deleted swarm {id}");
            Ok(())
        }
    }
}

async fn mail_command(orchestrator: &Orchestrator, cmd: MailCommand) -> Result<()> {
    match cmd {
        MailCommand::Send {
            from,
            to,
            subject,
            body,
        } => {
            let id = orchestrator.mail.send(&from, &to, body, subject).await?;
            println!("sent mail #{id}");
            Ok(())
        }
        MailCommand::List { handle, all } => {
            let messages = if all {
                orchestrator.mail.get_all(&handle, 50).await?
            } else {
                orchestrator.mail.get_unread(&handle).await?
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["id", "from", "subject", "body", "read"]);
            for m in messages {
                table.add_row(vec![
                    m.id.to_string(),
                    m.from_handle.clone(),
                    m.subject.clone().unwrap_or_default(),
                    m.body.clone(),
                    if m.is_unread() { "" } else { "yes" }.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

async fn board_command(orchestrator: &Orchestrator, cmd: BoardCommand) -> Result<()> {
    match cmd {
        BoardCommand::Post {
            swarm,
            sender,
            message_type,
            target,
            priority,
            payload,
        } => {
            let message_type = MessageType::parse_str(&message_type)
                .with_context(|| format!("unknown message type '{message_type}'"))?;
            let priority = match priority.as_str() {
                "low" => MessagePriority::Low,
                "normal" => MessagePriority::Normal,
                "high" => MessagePriority::High,
                "critical" => MessagePriority::Critical,
                other => bail!("unknown priority '{other}'"),
            };
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload must be valid JSON")?;
            let message = orchestrator
                .blackboard
                .post(
                    &swarm,
                    &sender,
                    message_type,
                    payload,
                    PostOptions {
                        target_handle: target,
                        priority: Some(priority),
                        expires_in_ms: None,
                    },
                )
                .await?;
            println!("posted message #{}", message.id);
            Ok(())
        }
        BoardCommand::Read {
            swarm,
            reader,
            unread_only,
        } => {
            let messages = orchestrator
                .blackboard
                .read(
                    &swarm,
                    BlackboardFilter {
                        reader_handle: reader,
                        unread_only,
                        ..BlackboardFilter::default()
                    },
                )
                .await?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["id", "sender", "target", "type", "payload"]);
            for m in messages {
                table.add_row(vec![
                    m.id.to_string(),
                    m.sender_handle.clone(),
                    m.target_handle.clone().unwrap_or_default(),
                    m.message_type.as_str().to_string(),
                    m.payload.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

async fn queue_command(orchestrator: &Orchestrator, cmd: QueueCommand) -> Result<()> {
    match cmd {
        QueueCommand::Add {
            requester,
            role,
            depth,
            priority,
            swarm,
            task,
        } => {
            let id = orchestrator
                .scheduler
                .queue_spawn(
                    &requester,
                    parse_role(&role)?,
                    depth,
                    &task,
                    QueueSpawnOptions {
                        priority,
                        swarm_id: swarm,
                        ..QueueSpawnOptions::default()
                    },
                )
                .await?;
            println!("queued {id}");
            Ok(())
        }
        QueueCommand::List { status } => {
            let status = match status {
                Some(s) => Some(
                    SpawnStatus::parse_str(&s).with_context(|| format!("unknown status '{s}'"))?,
                ),
                None => None,
            };
            let items = orchestrator.scheduler.list(status).await?;
            let mut table = Table::new();
            table.load_preset(UTF8_FULL).set_header(vec![
                "id", "requester", "role", "depth", "priority", "status", "task",
            ]);
            for item in items {
                table.add_row(vec![
                    item.id.to_string(),
                    item.requester_handle.clone(),
                    item.target_role.to_string(),
                    item.depth.to_string(),
                    item.priority.to_string(),
                    item.status.to_string(),
                    item.task.clone(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
    }
}

async fn checkpoint_command(orchestrator: &Orchestrator, cmd: CheckpointCommand) -> Result<()> {
    match cmd {
        CheckpointCommand::Create { from, to, goal } => {
            let id = orchestrator
                .checkpoints
                .create(&from, &to, None, CheckpointBody::new(goal))
                .await?;
            println!("created checkpoint #{id}");
            Ok(())
        }
        CheckpointCommand::List { handle } => {
            let checkpoints = orchestrator
                .checkpoints
                .list(&handle, Default::default())
                .await?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["id", "from", "goal", "status", "created"]);
            for c in checkpoints {
                table.add_row(vec![
                    c.id.to_string(),
                    c.from_handle.clone(),
                    c.body.goal.clone(),
                    c.status.as_str().to_string(),
                    c.created_at.to_rfc3339(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        CheckpointCommand::Accept { id } => {
            let flipped = orchestrator.checkpoints.accept(id).await?;
            println!(
                "{}",
                if flipped { "accepted" } else { "already settled" }
            );
            Ok(())
        }
        CheckpointCommand::Reject { id } => {
            let flipped = orchestrator.checkpoints.reject(id).await?;
            println!(
                "{}",
                if flipped { "rejected" } else { "already settled" }
            );
            Ok(())
        }
    }
}
