// src/store/mod.rs

//! Persistence port consumed by the lifecycle engine.
//!
//! The engine treats the store as synchronous and authoritative. Production
//! deployments put a database behind [`TaskStore`]; this crate ships the
//! in-memory [`memory::MemoryStore`] used by the runner binary and the tests.

use std::fmt::Debug;

use crate::errors::Result;
use crate::types::{
    Event, NewTask, ProjectId, RetrieveQueryParams, Task, TaskId, TaskOutput, TaskStatus,
    TemplateId,
};

pub mod memory;

pub use memory::MemoryStore;

/// Durable task records, their outputs and the event log.
///
/// Unknown ids surface as `TaskPoolError::NotFound`; store failures as
/// `TaskPoolError::Persistence`.
pub trait TaskStore: Send + Sync + Debug {
    /// Insert a new record with the given initial status. Assigns the id.
    fn create_task(&self, task: NewTask, status: TaskStatus) -> Result<Task>;

    /// Fetch a task scoped to its project.
    fn get_task(&self, project_id: ProjectId, task_id: TaskId) -> Result<Task>;

    /// Unconditionally overwrite the status of a task.
    fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()>;

    /// Write `new` only if the stored status still equals `expected`.
    ///
    /// Returns `false` (and writes nothing) when the stored status differs.
    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
    ) -> Result<bool>;

    /// Remove a task together with its outputs and events.
    fn delete_task_with_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<()>;

    fn create_event(&self, event: Event) -> Result<Event>;

    /// Events whose object is the given task, oldest first.
    fn task_events(&self, task_id: TaskId) -> Result<Vec<Event>>;

    fn append_output(&self, task_id: TaskId, output: String) -> Result<()>;

    fn task_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<Vec<TaskOutput>>;

    /// Tasks of a project, newest first.
    fn project_tasks(
        &self,
        project_id: ProjectId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>>;

    /// Tasks of a single template, newest first.
    fn template_tasks(
        &self,
        project_id: ProjectId,
        template_id: TemplateId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>>;
}
