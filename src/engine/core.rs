// src/engine/core.rs

//! State shared by the lifecycle API and the supervisor workers.
//!
//! `PoolCore` owns the store handle, the active registry and the
//! reconciliation table, and implements the two operations both sides need:
//! writing a status from inside an entry's exclusive section, and finishing
//! a task (durable terminal status, completion event, retirement).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::engine::PoolOptions;
use crate::engine::registry::{ActiveRegistry, ActiveTask, EntryState};
use crate::errors::{Result, TaskPoolError};
use crate::store::TaskStore;
use crate::types::{Event, TaskId, TaskStatus};

#[derive(Debug)]
pub(crate) struct PoolCore {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) registry: ActiveRegistry,
    pub(crate) options: PoolOptions,
    /// Statuses whose durable write kept failing, keyed by task. Each queue
    /// ends with the task's terminal status.
    pending_writes: Mutex<HashMap<TaskId, VecDeque<TaskStatus>>>,
}

impl PoolCore {
    pub(crate) fn new(store: Arc<dyn TaskStore>, options: PoolOptions) -> Self {
        Self {
            store,
            registry: ActiveRegistry::new(),
            options,
            pending_writes: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the in-memory status and write it through to the store.
    ///
    /// Must be called with the entry's exclusive section held (`state` is the
    /// guarded value), so the durable order of writes for a task matches the
    /// in-memory order. The in-memory status moves even if the write fails;
    /// a failed status stays queued on the entry and is written before any
    /// later one, so the stored record never skips a step.
    pub(crate) fn write_status(
        &self,
        state: &mut EntryState,
        task_id: TaskId,
        to: TaskStatus,
    ) -> Result<()> {
        state.advance(task_id, to);
        let unsynced = state.unsynced_mut();
        unsynced.push_back(to);
        self.flush(task_id, unsynced)
    }

    /// Write queued statuses oldest first, stopping at the first failure.
    fn flush(&self, task_id: TaskId, statuses: &mut VecDeque<TaskStatus>) -> Result<()> {
        while let Some(&status) = statuses.front() {
            self.store.update_task_status(task_id, status)?;
            statuses.pop_front();
        }
        Ok(())
    }

    /// Complete a task whose entry already holds a terminal status.
    ///
    /// `write` is the outcome of the in-section status write. A failed write
    /// is retried here, outside the section; once retries run out the status
    /// is parked for [`reconcile`](Self::reconcile). The completion event is
    /// appended either way and the entry is retired last.
    ///
    /// Returns the event-append error, if any.
    pub(crate) async fn finish(
        &self,
        entry: &ActiveTask,
        status: TaskStatus,
        write: Result<()>,
    ) -> Option<TaskPoolError> {
        let task_id = entry.id();

        if let Err(e) = write {
            let unsynced = entry.lock().take_unsynced();
            self.persist_with_retry(task_id, status, unsynced, e).await;
        }

        let event_error = self.append_event(Event::finished(entry.task(), status));
        self.registry.retire(task_id);

        info!(
            task_id,
            project_id = entry.task().project_id,
            %status,
            "task finished"
        );

        event_error
    }

    async fn persist_with_retry(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        mut unsynced: VecDeque<TaskStatus>,
        first: TaskPoolError,
    ) {
        warn!(task_id, %status, error = %first, "terminal status write failed; retrying");

        let retries = self.options.status_write_retries;
        for attempt in 1..=retries {
            tokio::time::sleep(self.options.retry_backoff * attempt).await;
            match self.flush(task_id, &mut unsynced) {
                Ok(()) => {
                    info!(task_id, %status, attempt, "terminal status written after retry");
                    return;
                }
                Err(e) => {
                    warn!(task_id, %status, attempt, error = %e, "status write retry failed");
                }
            }
        }

        error!(
            task_id,
            %status,
            lagging = unsynced.len(),
            "giving up on terminal status write; parked for reconciliation"
        );
        self.pending_writes.lock().insert(task_id, unsynced);
    }

    /// Append an event; failures are logged and handed back, never raised.
    pub(crate) fn append_event(&self, event: Event) -> Option<TaskPoolError> {
        let task_id = event.object_id;
        match self.store.create_event(event) {
            Ok(_) => None,
            Err(e) => {
                warn!(?task_id, error = %e, "failed to append task event");
                Some(e)
            }
        }
    }

    /// Retry every parked status write, replaying each task's statuses in
    /// order.
    ///
    /// Returns the number of tasks still pending afterwards. A task that no
    /// longer exists in the store is dropped from the table.
    pub(crate) fn reconcile(&self) -> usize {
        let mut pending = self.pending_writes.lock();
        if pending.is_empty() {
            return 0;
        }

        pending.retain(|&task_id, statuses| match self.flush(task_id, statuses) {
            Ok(()) => {
                info!(task_id, "reconciled terminal status");
                false
            }
            Err(TaskPoolError::NotFound(_)) => {
                warn!(task_id, "task vanished before reconciliation");
                false
            }
            Err(e) => {
                warn!(task_id, lagging = statuses.len(), error = %e, "reconciliation still failing");
                true
            }
        });

        pending.len()
    }

    /// The terminal status parked for `task_id`, if any.
    pub(crate) fn pending_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.pending_writes
            .lock()
            .get(&task_id)
            .and_then(|statuses| statuses.back().copied())
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending_writes.lock().len()
    }

    pub(crate) fn forget_pending(&self, task_id: TaskId) {
        self.pending_writes.lock().remove(&task_id);
    }
}
