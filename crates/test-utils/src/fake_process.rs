use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskpool::errors::{Result, TaskPoolError};
use taskpool::exec::{ProcessExit, ProcessHandle, ProcessLauncher, RunningProcess};
use taskpool::types::{Task, TaskId};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct FakeState {
    started: Vec<TaskId>,
    kills: Vec<TaskId>,
    exits: HashMap<TaskId, oneshot::Sender<ProcessExit>>,
    fail_start: HashSet<TaskId>,
    auto_exit: Option<ProcessExit>,
    exit_on_kill: bool,
    fail_kill: bool,
}

/// A fake process launcher.
///
/// - records which tasks were started and which were killed
/// - processes only exit when the test calls [`FakeLauncher::complete`],
///   unless `auto_exit` or `exit_on_kill` is configured
/// - start and kill failures can be injected
///
/// Clones share state, so keep one in the test and hand another to the pool.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every started process exits immediately with `exit`.
    pub fn auto_exit(self, exit: ProcessExit) -> Self {
        self.state.lock().auto_exit = Some(exit);
        self
    }

    /// A delivered kill makes the process exit right away.
    pub fn exit_on_kill(self, yes: bool) -> Self {
        self.state.lock().exit_on_kill = yes;
        self
    }

    /// Every kill request fails with `ProcessControl`.
    pub fn fail_kill(&self, yes: bool) {
        self.state.lock().fail_kill = yes;
    }

    /// Starting `task_id` fails.
    pub fn fail_start_of(&self, task_id: TaskId) {
        self.state.lock().fail_start.insert(task_id);
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.state.lock().started.clone()
    }

    pub fn kills(&self) -> Vec<TaskId> {
        self.state.lock().kills.clone()
    }

    pub fn was_started(&self, task_id: TaskId) -> bool {
        self.state.lock().started.contains(&task_id)
    }

    /// Make the process of `task_id` exit. Returns `false` if it is not
    /// running (never started, or already exited).
    pub fn complete(&self, task_id: TaskId, exit: ProcessExit) -> bool {
        let sender = self.state.lock().exits.remove(&task_id);
        match sender {
            Some(tx) => tx.send(exit).is_ok(),
            None => false,
        }
    }

    /// Poll until `task_id` has been started.
    pub async fn wait_started(&self, task_id: TaskId) {
        while !self.was_started(task_id) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn start(&self, task: &Task) -> Result<RunningProcess> {
        let mut state = self.state.lock();

        if state.fail_start.contains(&task.id) {
            return Err(TaskPoolError::ProcessControl {
                task_id: task.id,
                message: "fake start failure".to_string(),
            });
        }

        state.started.push(task.id);

        let (tx, rx) = oneshot::channel();
        match state.auto_exit.clone() {
            Some(exit) => {
                let _ = tx.send(exit);
            }
            None => {
                state.exits.insert(task.id, tx);
            }
        }

        Ok(RunningProcess {
            handle: Arc::new(FakeHandle {
                task_id: task.id,
                state: Arc::clone(&self.state),
            }),
            exit: rx,
        })
    }
}

#[derive(Debug)]
struct FakeHandle {
    task_id: TaskId,
    state: Arc<Mutex<FakeState>>,
}

impl ProcessHandle for FakeHandle {
    fn kill(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.kills.push(self.task_id);

        if state.fail_kill {
            return Err(TaskPoolError::ProcessControl {
                task_id: self.task_id,
                message: "fake kill failure".to_string(),
            });
        }

        if state.exit_on_kill {
            if let Some(tx) = state.exits.remove(&self.task_id) {
                let _ = tx.send(ProcessExit::failure(None, "killed"));
            }
        }

        Ok(())
    }
}
