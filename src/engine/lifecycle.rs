// src/engine/lifecycle.rs

//! Lifecycle API exposed to the HTTP layer.
//!
//! Admission, active-state queries, stop and removal, plus read-through
//! queries that go straight to the store.
//!
//! The admission gate: persistence assigns the task id, so a task exists in
//! the store a moment before it is registered as active. Admissions hold the
//! gate shared across "insert + register"; the two paths that act on tasks
//! *absent* from the registry (orphan stop, remove) hold it exclusively, so
//! they never mistake a half-admitted task for an orphan.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::engine::core::PoolCore;
use crate::engine::queue::AdmissionQueue;
use crate::engine::registry::{ActiveSnapshot, ActiveTask};
use crate::errors::{Result, TaskPoolError};
use crate::types::{
    Event, NewTask, ProjectId, RetrieveQueryParams, Task, TaskId, TaskOutput, TaskStatus,
    TemplateId, User,
};

/// Row limit used by [`LifecycleManager::last_tasks`].
pub const LAST_TASKS_LIMIT: usize = 200;

/// Result of a successful admission.
///
/// `event_error` is set when the task was admitted but its "queued" event
/// could not be written (degraded success).
#[derive(Debug)]
pub struct Admission {
    pub task: Task,
    pub event_error: Option<TaskPoolError>,
}

/// What a stop request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The task was still queued; it is now `stopped` and never ran.
    StoppedBeforeStart,
    /// The task was running; it is now `stopping` and a kill was delivered.
    KillRequested,
    /// A previous stop is still in flight.
    AlreadyStopping,
    /// The task already reached a terminal status.
    AlreadyFinished,
    /// The task was not active but its record was not terminal; the record
    /// was forced to `stopped`.
    ForceStopped,
}

#[derive(Debug)]
pub struct StopReport {
    pub outcome: StopOutcome,
    /// Set when the stop took effect but its event could not be written.
    pub event_error: Option<TaskPoolError>,
}

impl StopReport {
    fn new(outcome: StopOutcome) -> Self {
        Self {
            outcome,
            event_error: None,
        }
    }
}

enum InactiveStop {
    Done(StopReport),
    /// The task got registered while we were acquiring the gate.
    BecameActive(Arc<ActiveTask>),
}

/// Entry point for callers: admit, query, stop, remove.
#[derive(Debug)]
pub struct LifecycleManager {
    core: Arc<PoolCore>,
    queue: AdmissionQueue,
    gate: RwLock<()>,
}

impl LifecycleManager {
    pub(crate) fn new(core: Arc<PoolCore>, queue: AdmissionQueue) -> Self {
        Self {
            core,
            queue,
            gate: RwLock::new(()),
        }
    }

    /// Persist a new task as `waiting`, record a "queued" event, and queue
    /// it.
    ///
    /// A queue slot is reserved first; on a full queue this waits or fails
    /// with `QueueFull` depending on configuration. Nothing is queued if the
    /// insert fails.
    pub async fn admit(&self, new_task: NewTask) -> Result<Admission> {
        validate_new_task(&new_task)?;

        let slot = self.queue.reserve().await?;

        let task = {
            let _gate = self.gate.read();
            let task = self
                .core
                .store
                .create_task(new_task, TaskStatus::Waiting)
                .inspect_err(|e| error!(error = %e, "cannot create new task"))?;
            self.core.registry.register(task.clone());
            task
        };

        // Logged before a worker can see the task, so its events stay in order.
        let event_error = self.core.append_event(Event::queued(&task));

        slot.enqueue(task.id);

        info!(
            task_id = task.id,
            project_id = task.project_id,
            "task queued for running"
        );

        Ok(Admission { task, event_error })
    }

    /// The in-memory state of a task, if it is active.
    pub fn query_active(&self, task_id: TaskId) -> Option<ActiveSnapshot> {
        self.core.registry.snapshot(task_id)
    }

    /// Number of active (queued, running or stopping) tasks.
    pub fn active_count(&self) -> usize {
        self.core.registry.len()
    }

    pub fn active_ids(&self) -> Vec<TaskId> {
        self.core.registry.ids()
    }

    /// Request that a task stops.
    ///
    /// - queued: settles `stopped` right away, the task never starts;
    /// - running: marks `stopping` and delivers a kill; the supervisor
    ///   settles `stopped` when the process exits. A failed kill is returned
    ///   as `ProcessControl`, with the task left `stopping`;
    /// - stopping or finished: no-op;
    /// - not active but stored as non-terminal: the record is forced to
    ///   `stopped`, unless a terminal status lands first.
    pub async fn stop(&self, project_id: ProjectId, task_id: TaskId) -> Result<StopReport> {
        if let Some(entry) = self.active_in_project(project_id, task_id)? {
            return self.stop_active(entry).await;
        }

        match self.stop_inactive(project_id, task_id)? {
            InactiveStop::Done(report) => Ok(report),
            InactiveStop::BecameActive(entry) => self.stop_active(entry).await,
        }
    }

    async fn stop_active(&self, entry: Arc<ActiveTask>) -> Result<StopReport> {
        let task_id = entry.id();

        let (handle, write) = {
            let mut state = entry.lock();
            match state.status() {
                TaskStatus::Waiting => {
                    let write = self.core.write_status(&mut state, task_id, TaskStatus::Stopped);
                    (None, Some(write))
                }
                TaskStatus::Running => {
                    let Some(handle) = state.process().cloned() else {
                        panic!("running task {task_id} has no bound process handle");
                    };
                    if let Err(e) = self.core.write_status(&mut state, task_id, TaskStatus::Stopping) {
                        warn!(task_id, error = %e, "failed to persist stopping status; replayed on next write");
                    }
                    (Some(handle), None)
                }
                TaskStatus::Stopping => {
                    debug!(task_id, "stop requested for task already stopping");
                    return Ok(StopReport::new(StopOutcome::AlreadyStopping));
                }
                status => {
                    debug!(task_id, %status, "stop requested for finished task");
                    return Ok(StopReport::new(StopOutcome::AlreadyFinished));
                }
            }
        };

        if let Some(write) = write {
            info!(task_id, "stopping task before it started");
            let event_error = self.core.finish(&entry, TaskStatus::Stopped, write).await;
            return Ok(StopReport {
                outcome: StopOutcome::StoppedBeforeStart,
                event_error,
            });
        }

        if let Some(handle) = handle {
            info!(task_id, "kill requested for running task");
            handle.kill().inspect_err(|e| {
                error!(task_id, error = %e, "kill signal failed; task stays stopping");
            })?;
        }

        Ok(StopReport::new(StopOutcome::KillRequested))
    }

    fn stop_inactive(&self, project_id: ProjectId, task_id: TaskId) -> Result<InactiveStop> {
        let _gate = self.gate.write();

        if let Some(entry) = self.active_in_project(project_id, task_id)? {
            return Ok(InactiveStop::BecameActive(entry));
        }

        if let Some(status) = self.core.pending_status(task_id) {
            debug!(task_id, %status, "task finished; terminal status awaiting reconciliation");
            self.core.reconcile();
            return Ok(InactiveStop::Done(StopReport::new(StopOutcome::AlreadyFinished)));
        }

        loop {
            let task = self.core.store.get_task(project_id, task_id)?;
            if task.status.is_terminal() {
                return Ok(InactiveStop::Done(StopReport::new(StopOutcome::AlreadyFinished)));
            }

            if self
                .core
                .store
                .compare_and_set_status(task_id, task.status, TaskStatus::Stopped)?
            {
                warn!(
                    task_id,
                    previous = %task.status,
                    "task not active but stored as non-terminal; forced to stopped"
                );
                let event_error = self.core.append_event(Event::finished(&task, TaskStatus::Stopped));
                return Ok(InactiveStop::Done(StopReport {
                    outcome: StopOutcome::ForceStopped,
                    event_error,
                }));
            }

            debug!(task_id, "stored status changed under us; re-reading");
        }
    }

    /// Delete a finished task with its outputs and events.
    ///
    /// Fails with `NotFound` for unknown tasks, `Conflict` while the task is
    /// active, and `Unauthorized` unless `editor` is an admin.
    pub fn remove(&self, project_id: ProjectId, task_id: TaskId, editor: &User) -> Result<()> {
        let _gate = self.gate.write();

        self.core.store.get_task(project_id, task_id)?;

        if self.core.registry.lookup(task_id).is_some() {
            return Err(TaskPoolError::Conflict(format!(
                "task {task_id} is queued or running; stop it first"
            )));
        }

        if !editor.admin {
            warn!(user = %editor.username, task_id, "user is not permitted to delete task logs");
            return Err(TaskPoolError::Unauthorized(format!(
                "{} is not permitted to delete tasks",
                editor.username
            )));
        }

        self.core.forget_pending(task_id);
        self.core
            .store
            .delete_task_with_outputs(project_id, task_id)
            .inspect_err(|e| error!(task_id, error = %e, "cannot delete task"))?;

        info!(task_id, project_id, "task removed");
        Ok(())
    }

    /// Retry terminal status writes that failed during finalization.
    /// Returns how many are still pending.
    pub fn reconcile(&self) -> usize {
        self.core.reconcile()
    }

    pub fn pending_reconciliation(&self) -> usize {
        self.core.pending_count()
    }

    pub fn get_task(&self, project_id: ProjectId, task_id: TaskId) -> Result<Task> {
        self.core.store.get_task(project_id, task_id)
    }

    /// Project tasks, newest first. `limit == 0` means all.
    pub fn project_tasks(&self, project_id: ProjectId, limit: usize) -> Result<Vec<Task>> {
        self.core
            .store
            .project_tasks(project_id, RetrieveQueryParams { count: limit })
    }

    /// Tasks of one template, newest first. `limit == 0` means all.
    pub fn template_tasks(
        &self,
        project_id: ProjectId,
        template_id: TemplateId,
        limit: usize,
    ) -> Result<Vec<Task>> {
        self.core.store.template_tasks(
            project_id,
            template_id,
            RetrieveQueryParams { count: limit },
        )
    }

    pub fn all_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>> {
        self.project_tasks(project_id, 0)
    }

    pub fn last_tasks(&self, project_id: ProjectId) -> Result<Vec<Task>> {
        self.project_tasks(project_id, LAST_TASKS_LIMIT)
    }

    pub fn task_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<Vec<TaskOutput>> {
        self.core.store.task_outputs(project_id, task_id)
    }

    pub fn task_events(&self, project_id: ProjectId, task_id: TaskId) -> Result<Vec<Event>> {
        self.core.store.get_task(project_id, task_id)?;
        self.core.store.task_events(task_id)
    }

    /// Stop accepting admissions.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub async fn wait_idle(&self) {
        self.core.registry.wait_idle().await;
    }

    fn active_in_project(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> Result<Option<Arc<ActiveTask>>> {
        match self.core.registry.lookup(task_id) {
            Some(entry) if entry.task().project_id != project_id => {
                Err(TaskPoolError::NotFound(task_id))
            }
            other => Ok(other),
        }
    }
}

fn validate_new_task(task: &NewTask) -> Result<()> {
    if task.project_id <= 0 {
        return Err(TaskPoolError::Validation(format!(
            "project id must be positive (got {})",
            task.project_id
        )));
    }
    if !(task.params.is_object() || task.params.is_null()) {
        return Err(TaskPoolError::Validation(
            "task params must be a JSON object".to_string(),
        ));
    }
    Ok(())
}
