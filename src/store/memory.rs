// src/store/memory.rs

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use super::TaskStore;
use crate::errors::{Result, TaskPoolError};
use crate::types::{
    Event, NewTask, ProjectId, RetrieveQueryParams, Task, TaskId, TaskOutput, TaskStatus,
    TemplateId,
};

#[derive(Debug, Default)]
struct Tables {
    next_task_id: TaskId,
    next_event_id: i64,
    tasks: BTreeMap<TaskId, Task>,
    outputs: BTreeMap<TaskId, Vec<TaskOutput>>,
    events: Vec<Event>,
}

/// In-memory [`TaskStore`].
///
/// Ids are assigned from a counter starting at 1 and are never reused, so a
/// deleted task id never comes back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of task records currently stored.
    pub fn task_count(&self) -> usize {
        self.tables.lock().tasks.len()
    }
}

fn stamp(task: &mut Task, status: TaskStatus) {
    let now = Utc::now();
    if status == TaskStatus::Running && task.start.is_none() {
        task.start = Some(now);
    }
    if status.is_terminal() && task.end.is_none() {
        task.end = Some(now);
    }
    task.status = status;
}

fn limit(mut tasks: Vec<Task>, params: RetrieveQueryParams) -> Vec<Task> {
    tasks.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
    if params.count > 0 {
        tasks.truncate(params.count);
    }
    tasks
}

impl TaskStore for MemoryStore {
    fn create_task(&self, task: NewTask, status: TaskStatus) -> Result<Task> {
        if task.project_id <= 0 {
            return Err(TaskPoolError::Validation(format!(
                "invalid project id {}",
                task.project_id
            )));
        }

        let mut tables = self.tables.lock();
        tables.next_task_id += 1;
        let record = Task {
            id: tables.next_task_id,
            project_id: task.project_id,
            template_id: task.template_id,
            user_id: task.user_id,
            created: Utc::now(),
            start: None,
            end: None,
            status,
            params: task.params,
        };
        tables.tasks.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_task(&self, project_id: ProjectId, task_id: TaskId) -> Result<Task> {
        let tables = self.tables.lock();
        tables
            .tasks
            .get(&task_id)
            .filter(|t| t.project_id == project_id)
            .cloned()
            .ok_or(TaskPoolError::NotFound(task_id))
    }

    fn update_task_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskPoolError::NotFound(task_id))?;
        stamp(task, status);
        Ok(())
    }

    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        new: TaskStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();
        let task = tables
            .tasks
            .get_mut(&task_id)
            .ok_or(TaskPoolError::NotFound(task_id))?;
        if task.status != expected {
            return Ok(false);
        }
        stamp(task, new);
        Ok(true)
    }

    fn delete_task_with_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<()> {
        let mut tables = self.tables.lock();
        match tables.tasks.get(&task_id) {
            Some(task) if task.project_id == project_id => {}
            _ => return Err(TaskPoolError::NotFound(task_id)),
        }
        tables.tasks.remove(&task_id);
        tables.outputs.remove(&task_id);
        tables.events.retain(|e| e.object_id != Some(task_id));
        Ok(())
    }

    fn create_event(&self, mut event: Event) -> Result<Event> {
        let mut tables = self.tables.lock();
        tables.next_event_id += 1;
        event.id = tables.next_event_id;
        tables.events.push(event.clone());
        Ok(event)
    }

    fn task_events(&self, task_id: TaskId) -> Result<Vec<Event>> {
        let tables = self.tables.lock();
        Ok(tables
            .events
            .iter()
            .filter(|e| e.object_id == Some(task_id))
            .cloned()
            .collect())
    }

    fn append_output(&self, task_id: TaskId, output: String) -> Result<()> {
        let mut tables = self.tables.lock();
        if !tables.tasks.contains_key(&task_id) {
            return Err(TaskPoolError::NotFound(task_id));
        }
        tables.outputs.entry(task_id).or_default().push(TaskOutput {
            task_id,
            time: Utc::now(),
            output,
        });
        Ok(())
    }

    fn task_outputs(&self, project_id: ProjectId, task_id: TaskId) -> Result<Vec<TaskOutput>> {
        let tables = self.tables.lock();
        match tables.tasks.get(&task_id) {
            Some(task) if task.project_id == project_id => {}
            _ => return Err(TaskPoolError::NotFound(task_id)),
        }
        Ok(tables.outputs.get(&task_id).cloned().unwrap_or_default())
    }

    fn project_tasks(
        &self,
        project_id: ProjectId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>> {
        let tables = self.tables.lock();
        let tasks = tables
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        Ok(limit(tasks, params))
    }

    fn template_tasks(
        &self,
        project_id: ProjectId,
        template_id: TemplateId,
        params: RetrieveQueryParams,
    ) -> Result<Vec<Task>> {
        let tables = self.tables.lock();
        let tasks = tables
            .tasks
            .values()
            .filter(|t| t.project_id == project_id && t.template_id == Some(template_id))
            .cloned()
            .collect();
        Ok(limit(tasks, params))
    }
}
