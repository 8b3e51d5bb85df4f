// src/types.rs

//! Domain records shared by the store, the executor and the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type ProjectId = i64;
pub type TemplateId = i64;
pub type UserId = i64;

/// Object-type tag written on task events.
pub const TASK_OBJECT_TYPE: &str = "task";

/// Lifecycle status of a task.
///
/// ```text
/// waiting  -> running | stopping | stopped
/// running  -> success | error | stopping
/// stopping -> stopped
/// success, error, stopped: terminal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Waiting,
    Running,
    Stopping,
    Success,
    Error,
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Error | TaskStatus::Stopped
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Self-transitions are not edges.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, next),
            (Waiting, Running)
                | (Waiting, Stopping)
                | (Waiting, Stopped)
                | (Running, Success)
                | (Running, Error)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Stopping => "stopping",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "waiting" => Ok(TaskStatus::Waiting),
            "running" => Ok(TaskStatus::Running),
            "stopping" => Ok(TaskStatus::Stopping),
            "success" => Ok(TaskStatus::Success),
            "error" => Ok(TaskStatus::Error),
            "stopped" => Ok(TaskStatus::Stopped),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}

/// A run request as submitted by a caller, before persistence assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub project_id: ProjectId,
    #[serde(default)]
    pub template_id: Option<TemplateId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Execution parameters. Only the process launcher interprets these.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Durable task record.
///
/// `id` and `project_id` never change after creation; only `status` and the
/// `start`/`end` stamps are updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub template_id: Option<TemplateId>,
    pub user_id: Option<UserId>,
    pub created: DateTime<Utc>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub params: serde_json::Value,
}

impl Task {
    /// The shell command carried in `params.cmd`, if any.
    pub fn command(&self) -> Option<&str> {
        self.params.get("cmd").and_then(|v| v.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub project_id: Option<ProjectId>,
    pub user_id: Option<UserId>,
    pub object_type: String,
    pub object_id: Option<TaskId>,
    pub description: String,
    pub created: DateTime<Utc>,
}

impl Event {
    /// Event written when a task is admitted.
    pub fn queued(task: &Task) -> Self {
        Self::for_task(task, format!("Task ID {} queued for running", task.id))
    }

    /// Event written once a task reaches a terminal status.
    pub fn finished(task: &Task, status: TaskStatus) -> Self {
        let label = status.as_str().to_uppercase();
        Self::for_task(task, format!("Task ID {} finished - {}", task.id, label))
    }

    fn for_task(task: &Task, description: String) -> Self {
        Self {
            id: 0,
            project_id: Some(task.project_id),
            user_id: task.user_id,
            object_type: TASK_OBJECT_TYPE.to_string(),
            object_id: Some(task.id),
            description,
            created: Utc::now(),
        }
    }
}

/// One captured line of task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: TaskId,
    pub time: DateTime<Utc>,
    pub output: String,
}

/// Caller identity as far as the lifecycle API cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub admin: bool,
}

/// Paging for task list queries. `count == 0` means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrieveQueryParams {
    pub count: usize,
}

/// What `admit` does when the admission queue has no free slot.
///
/// - `Wait`: hold the caller until a worker frees a slot (backpressure).
/// - `Reject`: fail immediately with `QueueFull`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhenQueueFull {
    #[default]
    Wait,
    Reject,
}

impl FromStr for WhenQueueFull {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wait" => Ok(WhenQueueFull::Wait),
            "reject" => Ok(WhenQueueFull::Reject),
            other => Err(format!(
                "invalid when_full: {other} (expected \"wait\" or \"reject\")"
            )),
        }
    }
}
