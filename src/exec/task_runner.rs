// src/exec/task_runner.rs

//! Shell-backed process launcher.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskPoolError};
use crate::exec::backend::{ProcessExit, ProcessHandle, ProcessLauncher, RunningProcess};
use crate::store::TaskStore;
use crate::types::{Task, TaskId};

/// How long to keep draining stdout after the child has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs `params.cmd` through `sh -c` (`cmd /C` on Windows).
///
/// Stdout lines are stored as task output; stderr is logged at debug.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    store: Arc<dyn TaskStore>,
}

impl ShellLauncher {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

/// Kill switch for a shell process.
///
/// The first `kill` hands the request to the runner future; the runner does
/// the actual `Child::kill`.
#[derive(Debug)]
struct ShellHandle {
    task_id: TaskId,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl ProcessHandle for ShellHandle {
    fn kill(&self) -> Result<()> {
        let Some(cancel) = self.cancel.lock().take() else {
            return Err(TaskPoolError::ProcessControl {
                task_id: self.task_id,
                message: "kill already requested".to_string(),
            });
        };

        cancel.send(()).map_err(|_| TaskPoolError::ProcessControl {
            task_id: self.task_id,
            message: "process already exited".to_string(),
        })
    }
}

impl ProcessLauncher for ShellLauncher {
    fn start(&self, task: &Task) -> Result<RunningProcess> {
        let command_line = task.command().ok_or_else(|| {
            TaskPoolError::Validation(format!("task {} has no `cmd` parameter", task.id))
        })?;

        info!(task_id = task.id, cmd = %command_line, "starting task process");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command_line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command_line);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task {}", task.id))?;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<ProcessExit>();

        let store = Arc::clone(&self.store);
        let task_id = task.id;
        tokio::spawn(async move {
            let exit = supervise_child(task_id, child, cancel_rx, store).await;
            if exit_tx.send(exit).is_err() {
                debug!(task_id, "nobody waiting for process exit");
            }
        });

        Ok(RunningProcess {
            handle: Arc::new(ShellHandle {
                task_id,
                cancel: Mutex::new(Some(cancel_tx)),
            }),
            exit: exit_rx,
        })
    }
}

/// Wait for the child to exit, killing it first if a cancel request arrives.
async fn supervise_child(
    task_id: TaskId,
    mut child: Child,
    mut cancel_rx: oneshot::Receiver<()>,
    store: Arc<dyn TaskStore>,
) -> ProcessExit {
    let stdout_reader = child.stdout.take().map(|stdout| {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Err(e) = store.append_output(task_id, line) {
                    warn!(task_id, error = %e, "failed to store task output line");
                }
            }
        })
    });

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task_id, "stderr: {}", line);
            }
        });
    }

    let mut killed = false;
    let status = tokio::select! {
        status = child.wait() => status,
        cancel = &mut cancel_rx => {
            if cancel.is_ok() {
                info!(task_id, "kill requested; killing task process");
                killed = true;
                if let Err(e) = child.start_kill() {
                    warn!(task_id, error = %e, "failed to signal task process");
                }
            }
            child.wait().await
        }
    };

    if let Some(reader) = stdout_reader {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
            debug!(task_id, "stdout still open after exit; not waiting for it");
        }
    }

    match status {
        Ok(status) => {
            let code = status.code();
            info!(
                task_id,
                exit_code = code.unwrap_or(-1),
                success = status.success(),
                killed,
                "task process exited"
            );
            if status.success() {
                ProcessExit::success()
            } else if killed {
                ProcessExit::failure(code, "killed")
            } else {
                ProcessExit::failure(code, format!("exited with status {status}"))
            }
        }
        Err(e) => {
            warn!(task_id, error = %e, "waiting for task process failed");
            ProcessExit::failure(None, format!("waiting for process: {e}"))
        }
    }
}
