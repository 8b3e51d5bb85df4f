// src/engine/registry.rs

//! Active task registry.
//!
//! One [`ActiveTask`] exists per task that is queued, running or stopping.
//! Each entry carries its own exclusive section (`ActiveTask::lock`); every
//! status change or process binding on that entry happens while holding it.
//! Unrelated tasks never share a lock: the table itself is a sharded
//! `DashMap` and guards are never held across lookups.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

use crate::exec::ProcessHandle;
use crate::types::{Task, TaskId, TaskStatus};

/// Mutable part of an entry, only reachable through the exclusive section.
#[derive(Debug)]
pub struct EntryState {
    status: TaskStatus,
    process: Option<Arc<dyn ProcessHandle>>,
    /// Statuses reached in memory but not yet accepted by the store, oldest
    /// first. They are written in this order before anything newer.
    unsynced: VecDeque<TaskStatus>,
}

impl EntryState {
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn process(&self) -> Option<&Arc<dyn ProcessHandle>> {
        self.process.as_ref()
    }

    /// Move along one edge of the state machine.
    ///
    /// Panics on an illegal edge: callers decide transitions from the status
    /// they observed under the same lock, so a bad edge is a bug.
    pub(crate) fn advance(&mut self, task_id: TaskId, to: TaskStatus) {
        assert!(
            self.status.can_transition_to(to),
            "illegal status transition {} -> {} for task {}",
            self.status,
            to,
            task_id
        );
        self.status = to;
    }

    /// Attach the process handle. Happens once, when execution starts.
    pub(crate) fn bind(&mut self, task_id: TaskId, handle: Arc<dyn ProcessHandle>) {
        assert!(
            self.process.is_none(),
            "process handle bound twice for task {task_id}"
        );
        self.process = Some(handle);
    }

    pub(crate) fn unsynced_mut(&mut self) -> &mut VecDeque<TaskStatus> {
        &mut self.unsynced
    }

    pub(crate) fn take_unsynced(&mut self) -> VecDeque<TaskStatus> {
        std::mem::take(&mut self.unsynced)
    }
}

/// In-memory representation of one admitted, not yet retired task.
pub struct ActiveTask {
    task: Task,
    state: Mutex<EntryState>,
}

impl fmt::Debug for ActiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTask")
            .field("task_id", &self.task.id)
            .field("state", &self.state)
            .finish()
    }
}

impl ActiveTask {
    fn new(task: Task) -> Self {
        let state = EntryState {
            status: task.status,
            process: None,
            unsynced: VecDeque::new(),
        };
        Self {
            task,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// The record as it was admitted.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Current status. Takes the exclusive section briefly.
    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// Enter the exclusive section.
    ///
    /// The guard must be released before any `.await`.
    pub fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock()
    }

    pub fn snapshot(&self) -> ActiveSnapshot {
        let state = self.state.lock();
        let mut task = self.task.clone();
        task.status = state.status;
        ActiveSnapshot {
            task,
            status: state.status,
            has_process: state.process.is_some(),
        }
    }
}

/// Point-in-time copy of an active entry, for callers outside the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSnapshot {
    pub task: Task,
    pub status: TaskStatus,
    pub has_process: bool,
}

/// Concurrency-safe table of active tasks.
#[derive(Debug)]
pub struct ActiveRegistry {
    entries: DashMap<TaskId, Arc<ActiveTask>>,
    active_count: watch::Sender<usize>,
}

impl Default for ActiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRegistry {
    pub fn new() -> Self {
        let (active_count, _) = watch::channel(0);
        Self {
            entries: DashMap::new(),
            active_count,
        }
    }

    /// Insert a freshly admitted task.
    ///
    /// Panics if the id is already registered: persistence hands out a fresh
    /// id per admission, so a duplicate means the store is broken.
    pub fn register(&self, task: Task) -> Arc<ActiveTask> {
        let task_id = task.id;
        let entry = match self.entries.entry(task_id) {
            Entry::Occupied(_) => panic!("task {task_id} is already registered"),
            Entry::Vacant(slot) => {
                let entry = Arc::new(ActiveTask::new(task));
                slot.insert(Arc::clone(&entry));
                entry
            }
        };
        self.active_count.send_modify(|n| *n += 1);
        debug!(task_id, "registered active task");
        entry
    }

    pub fn lookup(&self, task_id: TaskId) -> Option<Arc<ActiveTask>> {
        self.entries.get(&task_id).map(|e| Arc::clone(e.value()))
    }

    /// Remove an entry. Returns `false` if it was not registered.
    pub fn retire(&self, task_id: TaskId) -> bool {
        let removed = self.entries.remove(&task_id).is_some();
        if removed {
            self.active_count.send_modify(|n| *n -= 1);
            debug!(task_id, "retired active task");
        }
        removed
    }

    pub fn snapshot(&self, task_id: TaskId) -> Option<ActiveSnapshot> {
        self.lookup(task_id).map(|entry| entry.snapshot())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of all active tasks, in no particular order.
    pub fn ids(&self) -> Vec<TaskId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Resolve once no task is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.active_count.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
