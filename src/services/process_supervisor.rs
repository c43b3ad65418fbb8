//! Process supervisor.
//!
//! Owns the subprocess for each worker: spawn with a composed prompt on
//! stdin, stream output as line events, watch for ready/success markers,
//! detect idleness, signal, and observe exit. Line parsing is a best-effort
//! secondary observation, never a correctness requirement.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{OrchestratorEvent, WorkerProcessConfig, WorkerRole};

use super::event_bus::EventBus;

/// Everything needed to launch one worker subprocess.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub worker_id: Uuid,
    pub handle: String,
    pub role: WorkerRole,
    /// Command vector; the first element is the program
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// Written to stdin immediately after launch
    pub initial_prompt: Option<String>,
    /// Marks the worker ready for work
    pub ready_pattern: Option<Regex>,
    /// Marks the worker's task done, for wave bookkeeping
    pub success_pattern: Option<Regex>,
}

#[derive(Debug)]
struct ProcState {
    last_output: Instant,
    last_line: String,
    ready_matched: bool,
    success_matched: bool,
    /// `Some(code)` once exited; inner `None` means killed by signal
    exit: Option<Option<i32>>,
}

struct ProcHandle {
    handle: String,
    pid: u32,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    state: Mutex<ProcState>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
}

/// Supervises worker subprocesses. One output-streaming task and one exit
/// waiter per process; all other access is keyed by handle.
pub struct ProcessSupervisor {
    event_bus: Arc<EventBus>,
    config: WorkerProcessConfig,
    idle_pattern: Regex,
    procs: Mutex<HashMap<String, Arc<ProcHandle>>>,
}

impl ProcessSupervisor {
    pub fn new(event_bus: Arc<EventBus>, config: WorkerProcessConfig) -> OrchestratorResult<Self> {
        let idle_pattern = Regex::new(&config.idle_prompt_pattern).map_err(|e| {
            OrchestratorError::ValidationFailed(format!("bad idle_prompt_pattern: {e}"))
        })?;
        Ok(Self {
            event_bus,
            config,
            idle_pattern,
            procs: Mutex::new(HashMap::new()),
        })
    }

    fn proc(&self, handle: &str) -> OrchestratorResult<Arc<ProcHandle>> {
        self.procs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(handle)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "worker process",
                id: handle.to_string(),
            })
    }

    /// Launch a worker subprocess.
    ///
    /// The child inherits `WORKER_ID`, `WORKER_HANDLE`, and `WORKER_ROLE`,
    /// starts in `working_dir`, and receives the initial prompt on stdin.
    /// Returns the OS pid. Blocks until the child is launched, not until it
    /// is ready.
    pub async fn spawn(&self, spec: SpawnSpec) -> OrchestratorResult<u32> {
        if spec.command.is_empty() {
            return Err(OrchestratorError::SpawnFailed {
                handle: spec.handle,
                reason: "empty command vector".to_string(),
            });
        }

        info!(handle = %spec.handle, command = ?spec.command, cwd = %spec.working_dir.display(), "spawning worker process");

        let mut child = Command::new(&spec.command[0])
            .args(&spec.command[1..])
            .current_dir(&spec.working_dir)
            .env("WORKER_ID", spec.worker_id.to_string())
            .env("WORKER_HANDLE", &spec.handle)
            .env("WORKER_ROLE", spec.role.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::SpawnFailed {
                handle: spec.handle.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| OrchestratorError::SpawnFailed {
            handle: spec.handle.clone(),
            reason: "child exited before pid was observed".to_string(),
        })?;

        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        if let (Some(prompt), Some(sink)) = (spec.initial_prompt.as_deref(), stdin.as_mut()) {
            sink.write_all(prompt.as_bytes())
                .await
                .map_err(|e| OrchestratorError::SpawnFailed {
                    handle: spec.handle.clone(),
                    reason: format!("failed to write initial prompt: {e}"),
                })?;
            sink.write_all(b"\n").await.ok();
            sink.flush().await.ok();
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let proc = Arc::new(ProcHandle {
            handle: spec.handle.clone(),
            pid,
            stdin: tokio::sync::Mutex::new(stdin),
            state: Mutex::new(ProcState {
                last_output: Instant::now(),
                last_line: String::new(),
                ready_matched: false,
                success_matched: false,
                exit: None,
            }),
            exit_rx,
        });

        // One streaming task per output pipe.
        if let Some(stdout) = stdout {
            self.stream_lines(Arc::clone(&proc), stdout, spec.ready_pattern.clone(), spec.success_pattern.clone());
        }
        if let Some(stderr) = stderr {
            self.stream_lines(Arc::clone(&proc), stderr, spec.ready_pattern, spec.success_pattern);
        }

        // Exit waiter owns the child from here on.
        {
            let proc = Arc::clone(&proc);
            let event_bus = Arc::clone(&self.event_bus);
            tokio::spawn(async move {
                let exit = match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(handle = %proc.handle, error = %e, "failed waiting on child");
                        None
                    }
                };
                proc.state.lock().unwrap_or_else(|e| e.into_inner()).exit = Some(exit);
                let _ = exit_tx.send(Some(exit));
                event_bus.emit(OrchestratorEvent::WorkerExited {
                    handle: proc.handle.clone(),
                    exit_code: exit,
                });
            });
        }

        self.procs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(spec.handle, proc);

        Ok(pid)
    }

    fn stream_lines<R>(
        &self,
        proc: Arc<ProcHandle>,
        reader: R,
        ready_pattern: Option<Regex>,
        success_pattern: Option<Regex>,
    ) where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let event_bus = Arc::clone(&self.event_bus);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut newly_ready = false;
                {
                    let mut state = proc.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.last_output = Instant::now();
                    state.last_line = line.clone();
                    if let Some(pattern) = &ready_pattern {
                        if !state.ready_matched && pattern.is_match(&line) {
                            state.ready_matched = true;
                            newly_ready = true;
                        }
                    }
                    if let Some(pattern) = &success_pattern {
                        if pattern.is_match(&line) {
                            state.success_matched = true;
                        }
                    }
                }
                event_bus.emit(OrchestratorEvent::WorkerOutput {
                    handle: proc.handle.clone(),
                    line,
                });
                if newly_ready {
                    event_bus.emit(OrchestratorEvent::WorkerReady {
                        handle: proc.handle.clone(),
                    });
                }
            }
        });
    }

    /// Write a line of input to the worker's stdin.
    pub async fn send_input(&self, handle: &str, text: &str) -> OrchestratorResult<()> {
        let proc = self.proc(handle)?;
        let mut stdin = proc.stdin.lock().await;
        let sink = stdin.as_mut().ok_or_else(|| OrchestratorError::InvalidState {
            entity: "worker process",
            id: handle.to_string(),
            reason: "stdin closed".to_string(),
        })?;
        sink.write_all(text.as_bytes())
            .await
            .map_err(|e| OrchestratorError::StorageIo(format!("stdin write failed: {e}")))?;
        sink.write_all(b"\n").await.ok();
        sink.flush().await.ok();
        Ok(())
    }

    /// Send SIGINT.
    pub fn interrupt(&self, handle: &str) -> OrchestratorResult<()> {
        let proc = self.proc(handle)?;
        signal_pid(proc.pid, Signal::SIGINT);
        Ok(())
    }

    /// Write an ESC byte to stdin, for interactive prompt UIs.
    pub async fn escape(&self, handle: &str) -> OrchestratorResult<()> {
        let proc = self.proc(handle)?;
        let mut stdin = proc.stdin.lock().await;
        if let Some(sink) = stdin.as_mut() {
            sink.write_all(&[0x1b]).await.ok();
            sink.flush().await.ok();
        }
        Ok(())
    }

    /// Soft-terminate, then hard-kill after the grace period. Returns the
    /// exit code when one was observed.
    pub async fn terminate(&self, handle: &str) -> OrchestratorResult<Option<i32>> {
        let proc = self.proc(handle)?;
        if self.exit_status(handle).is_some() {
            return Ok(self.exit_status(handle).flatten());
        }

        debug!(handle, pid = proc.pid, "sending SIGTERM");
        signal_pid(proc.pid, Signal::SIGTERM);

        let grace = Duration::from_millis(self.config.terminate_grace_ms);
        if let Some(exit) = self.await_exit(handle, grace).await {
            return Ok(exit);
        }

        warn!(handle, pid = proc.pid, "grace period elapsed, sending SIGKILL");
        signal_pid(proc.pid, Signal::SIGKILL);
        Ok(self
            .await_exit(handle, Duration::from_secs(5))
            .await
            .flatten())
    }

    /// Kill an orphan by pid, outside any tracked process.
    pub fn kill_pid(pid: u32) {
        signal_pid(pid, Signal::SIGKILL);
    }

    /// Wait until the process exits or the timeout elapses.
    pub async fn await_exit(&self, handle: &str, timeout: Duration) -> Option<Option<i32>> {
        let proc = self.proc(handle).ok()?;
        let mut rx = proc.exit_rx.clone();
        if let Some(exit) = *rx.borrow() {
            return Some(exit);
        }
        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return None;
                }
                if let Some(exit) = *rx.borrow() {
                    return Some(exit);
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }

    pub fn is_running(&self, handle: &str) -> bool {
        self.exit_status(handle).is_none() && self.proc(handle).is_ok()
    }

    /// `Some(code)` once exited; inner `None` means killed by signal.
    pub fn exit_status(&self, handle: &str) -> Option<Option<i32>> {
        let proc = self.proc(handle).ok()?;
        let state = proc.state.lock().unwrap_or_else(|e| e.into_inner());
        state.exit
    }

    pub fn pid(&self, handle: &str) -> Option<u32> {
        self.proc(handle).ok().map(|p| p.pid)
    }

    pub fn ready_matched(&self, handle: &str) -> bool {
        self.proc(handle).map_or(false, |p| {
            p.state.lock().unwrap_or_else(|e| e.into_inner()).ready_matched
        })
    }

    pub fn success_matched(&self, handle: &str) -> bool {
        self.proc(handle).map_or(false, |p| {
            p.state.lock().unwrap_or_else(|e| e.into_inner()).success_matched
        })
    }

    /// A worker is idle when output has been silent for the stable window
    /// and the last line matches the configured prompt shape.
    pub fn is_idle(&self, handle: &str) -> bool {
        let Ok(proc) = self.proc(handle) else {
            return false;
        };
        let state = proc.state.lock().unwrap_or_else(|e| e.into_inner());
        state.exit.is_none()
            && state.last_output.elapsed() >= Duration::from_millis(self.config.idle_stable_ms)
            && self.idle_pattern.is_match(&state.last_line)
    }

    /// Forget a process. Does not signal it.
    pub fn remove(&self, handle: &str) {
        self.procs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(handle);
    }

    pub fn tracked_handles(&self) -> Vec<String> {
        self.procs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

fn signal_pid(pid: u32, signal: Signal) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        debug!(pid, ?signal, error = %e, "signal delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(Arc::new(EventBus::new()), WorkerProcessConfig::default())
            .expect("supervisor")
    }

    fn spec(handle: &str, script: &str) -> SpawnSpec {
        SpawnSpec {
            worker_id: Uuid::new_v4(),
            handle: handle.into(),
            role: WorkerRole::Worker,
            command: vec!["sh".into(), "-c".into(), script.into()],
            working_dir: std::env::temp_dir(),
            initial_prompt: None,
            ready_pattern: None,
            success_pattern: None,
        }
    }

    #[tokio::test]
    async fn test_spawn_and_exit() {
        let sup = supervisor();
        sup.spawn(spec("t1", "exit 0")).await.expect("spawn");
        let exit = sup.await_exit("t1", Duration::from_secs(5)).await;
        assert_eq!(exit, Some(Some(0)));
    }

    #[tokio::test]
    async fn test_env_and_prompt_reach_child() {
        let sup = supervisor();
        let mut s = spec("t2", "read line; echo \"$line:$WORKER_HANDLE\"");
        s.initial_prompt = Some("hello".into());
        s.success_pattern = Some(Regex::new("hello:t2").unwrap());
        sup.spawn(s).await.expect("spawn");
        sup.await_exit("t2", Duration::from_secs(5)).await;
        assert!(sup.success_matched("t2"));
    }

    #[tokio::test]
    async fn test_ready_marker() {
        let sup = supervisor();
        let mut s = spec("t3", "echo READY; sleep 5");
        s.ready_pattern = Some(Regex::new("READY").unwrap());
        sup.spawn(s).await.expect("spawn");
        // Give the streaming task a moment.
        for _ in 0..50 {
            if sup.ready_matched("t3") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(sup.ready_matched("t3"));
        sup.terminate("t3").await.expect("terminate");
    }

    #[tokio::test]
    async fn test_terminate_stubborn_child() {
        let event_bus = Arc::new(EventBus::new());
        let config = WorkerProcessConfig {
            terminate_grace_ms: 200,
            ..WorkerProcessConfig::default()
        };
        let sup = ProcessSupervisor::new(event_bus, config).expect("supervisor");
        sup.spawn(spec("t4", "trap '' TERM; sleep 30")).await.expect("spawn");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let exit = sup.terminate("t4").await.expect("terminate");
        // Killed by SIGKILL, so no exit code.
        assert_eq!(exit, None);
        assert!(sup.exit_status("t4").is_some());
    }
}
