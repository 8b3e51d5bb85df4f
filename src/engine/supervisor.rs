// src/engine/supervisor.rs

//! Execution supervisor: the worker pool draining the admission queue.
//!
//! For every dequeued task a worker:
//! 1. looks the task up (it may already be retired by a stop),
//! 2. inside the entry's exclusive section, starts the process and promotes
//!    `waiting -> running`, or skips the task if a stop got there first,
//! 3. waits for the exit notification outside the section,
//! 4. re-enters the section and settles `stopped`, `success` or `error`,
//! 5. finishes the task (durable status, completion event, retirement).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::core::PoolCore;
use crate::engine::queue::AdmissionReceiver;
use crate::errors::Result;
use crate::exec::{ProcessExit, ProcessLauncher};
use crate::types::{TaskId, TaskStatus};

/// Async callback run after a worker picked a task up and before it enters
/// the task's exclusive section to promote it.
pub type PromoteHook =
    Arc<dyn Fn(TaskId) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Handles of the running worker tasks.
#[derive(Debug)]
pub struct Supervisor {
    workers: Vec<JoinHandle<()>>,
}

struct Worker {
    index: usize,
    core: Arc<PoolCore>,
    queue: Arc<AdmissionReceiver>,
    launcher: Arc<dyn ProcessLauncher>,
    promote_hook: Option<PromoteHook>,
}

impl Supervisor {
    /// Spawn `core.options.workers` workers on the current Tokio runtime.
    pub(crate) fn spawn(
        core: Arc<PoolCore>,
        queue: AdmissionReceiver,
        launcher: Arc<dyn ProcessLauncher>,
        promote_hook: Option<PromoteHook>,
    ) -> Self {
        let queue = Arc::new(queue);
        let count = core.options.workers.max(1);

        let workers = (0..count)
            .map(|index| {
                let worker = Worker {
                    index,
                    core: Arc::clone(&core),
                    queue: Arc::clone(&queue),
                    launcher: Arc::clone(&launcher),
                    promote_hook: promote_hook.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = count, "supervisor started");
        Self { workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit. Workers exit once the admission queue
    /// is closed and drained.
    pub async fn join(self) {
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "supervisor worker panicked");
            }
        }
        info!("supervisor stopped");
    }
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.index, "worker loop started");

        while let Some(task_id) = self.queue.next().await {
            self.execute(task_id).await;

            let remaining = self.core.reconcile();
            if remaining > 0 {
                warn!(worker = self.index, remaining, "status writes awaiting reconciliation");
            }
        }

        debug!(worker = self.index, "worker loop finished (queue closed)");
    }

    async fn execute(&self, task_id: TaskId) {
        let Some(entry) = self.core.registry.lookup(task_id) else {
            debug!(worker = self.index, task_id, "task retired before pickup; skipping");
            return;
        };

        if let Some(hook) = &self.promote_hook {
            hook(task_id).await;
        }

        let started: std::result::Result<_, Result<()>> = {
            let mut state = entry.lock();

            if state.status() != TaskStatus::Waiting {
                debug!(
                    worker = self.index,
                    task_id,
                    status = %state.status(),
                    "task no longer waiting; skipping"
                );
                return;
            }

            match self.launcher.start(entry.task()) {
                Ok(process) => {
                    state.bind(task_id, process.handle);
                    if let Err(e) = self.core.write_status(&mut state, task_id, TaskStatus::Running) {
                        warn!(task_id, error = %e, "failed to persist running status; replayed on next write");
                    }
                    Ok(process.exit)
                }
                Err(e) => {
                    error!(worker = self.index, task_id, error = %e, "failed to start task process");
                    if let Err(e) = self.core.write_status(&mut state, task_id, TaskStatus::Running) {
                        warn!(task_id, error = %e, "failed to persist running status; replayed on next write");
                    }
                    Err(self.core.write_status(&mut state, task_id, TaskStatus::Error))
                }
            }
        };

        let exit_rx = match started {
            Ok(exit_rx) => exit_rx,
            Err(write) => {
                self.core.finish(&entry, TaskStatus::Error, write).await;
                return;
            }
        };

        info!(worker = self.index, task_id, "task running");

        let exit = exit_rx
            .await
            .unwrap_or_else(|_| ProcessExit::failure(None, "exit notification lost"));

        let (status, write) = {
            let mut state = entry.lock();
            let status = match state.status() {
                TaskStatus::Stopping => TaskStatus::Stopped,
                TaskStatus::Running if exit.success => TaskStatus::Success,
                TaskStatus::Running => TaskStatus::Error,
                other => panic!("task {task_id} observed in status {other} at process exit"),
            };
            (status, self.core.write_status(&mut state, task_id, status))
        };

        if let Some(message) = exit.message.as_deref() {
            debug!(task_id, code = ?exit.code, message, "process exit details");
        }

        self.core.finish(&entry, status, write).await;
    }
}
