use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use taskpool::errors::{Result, TaskPoolError};
use taskpool::store::{MemoryStore, TaskStore};
use taskpool::types::{
    Event, NewTask, ProjectId, RetrieveQueryParams, Task, TaskId, TaskOutput, TaskStatus,
    TemplateId,
};

/// A `MemoryStore` wrapper with injectable failures.
///
/// Also records, per task, every status that was durably written (initial
/// status, plain updates and successful compare-and-set), in order.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_creates: AtomicBool,
    fail_events: AtomicBool,
    /// Remaining forced failures for writes of a given status.
    failing_writes: Mutex<HashMap<TaskStatus, usize>>,
    history: Mutex<HashMap<TaskId, Vec<TaskStatus>>>,
}

fn injected(what: &str) -> TaskPoolError {
    TaskPoolError::Persistence(format!("injected {what} failure"))
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_creates(&self, yes: bool) {
        self.fail_creates.store(yes, Ordering::SeqCst);
    }

    pub fn fail_events(&self, yes: bool) {
        self.fail_events.store(yes, Ordering::SeqCst);
    }

    /// Fail the next `times` writes of `status` (`usize::MAX` = until
    /// [`heal_writes`](Self::heal_writes)).
    pub fn fail_writes_of(&self, status: TaskStatus, times: usize) {
        self.failing_writes.lock().insert(status, times);
    }

    pub fn heal_writes(&self) {
        self.failing_writes.lock().clear();
    }

    /// Every status durably written for `task_id`, oldest first.
    pub fn status_history(&self, task_id: TaskId) -> Vec<TaskStatus> {
        self.history
            .lock()
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    fn take_write_failure(&self, status: TaskStatus) -> bool {
        let mut failing = self.failing_writes.lock();
        match failing.get_mut(&status) {
            Some(0) | None => false,
            Some(n) => {
                if *n != usize::MAX {
                    *n -= 1;
                }
                true
            }
        }
    }

    fn record(&self, task_id: TaskId, status: TaskStatus) {
        self.history.lock().entry(task_id).or_default().push(status);
    }
}

impl TaskStore for FlakyStore {
    fn create_task(&self, task: NewTask, status: TaskStatus) -> Result<Task> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(injected("create"));
        }
        let task = self.inner.create_task(task, status)?;
        self.record(task.id, status);
        Ok(task)
    }

    fn get_task(&self, project_id: ProjectId, task_id: TaskId) -> Result<Task> {
        self.inner.get_task(project_id, task_id)
    }

    fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()> {
        if self.take_write_failure(status) {
            return Err(injected("status write"));
        }
        self.inner.update_task_status(task_id, status)?;
        self.record(task_id, status);
        Ok(())
    }

    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
    ) -> Result<bool> {
        if self.take_write_failure(new) {
            return Err(injected("status write"));
        }
        let swapped = self.inner.compare_and_set_status(task_id, expected, new)?;
        if swapped {
            self.record(task_id, new);
        }
        Ok(swapped)
    }

    fn delete_task_with_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<()> {
        self.inner.delete_task_with_outputs(project_id, task_id)
    }

    fn create_event(&self, event: Event) -> Result<Event> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(injected("event"));
        }
        self.inner.create_event(event)
    }

    fn task_events(&self, task_id: TaskId) -> Result<Vec<Event>> {
        self.inner.task_events(task_id)
    }

    fn append_output(&self, task_id: TaskId, output: String) -> Result<()> {
        self.inner.append_output(task_id, output)
    }

    fn task_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<Vec<TaskOutput>> {
        self.inner.task_outputs(project_id, task_id)
    }

    fn project_tasks(
        &self,
        project_id: ProjectId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>> {
        self.inner.project_tasks(project_id, params)
    }

    fn template_tasks(
        &self,
        project_id: ProjectId,
        template_id: TemplateId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>> {
        self.inner.template_tasks(project_id, template_id, params)
    }
}
