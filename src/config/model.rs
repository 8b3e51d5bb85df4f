// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::engine::PoolOptions;
use crate::types::{NewTask, ProjectId, TemplateId, UserId, WhenQueueFull};

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [pool]
/// workers = 4
/// queue_capacity = 64
/// when_full = "reject"
///
/// [task.build]
/// project = 1
/// template = 3
/// cmd = "make build"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pool: PoolSection,

    /// Keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pool: PoolSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(pool: PoolSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { pool, task }
    }
}

/// `[pool]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSection {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// `"wait"` (default) or `"reject"`.
    #[serde(default)]
    pub when_full: WhenQueueFull,

    #[serde(default = "default_status_write_retries")]
    pub status_write_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_workers() -> usize {
    PoolOptions::default().workers
}

fn default_queue_capacity() -> usize {
    PoolOptions::default().queue_capacity
}

fn default_status_write_retries() -> u32 {
    PoolOptions::default().status_write_retries
}

fn default_retry_backoff_ms() -> u64 {
    PoolOptions::default().retry_backoff.as_millis() as u64
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            when_full: WhenQueueFull::default(),
            status_write_retries: default_status_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl From<PoolSection> for PoolOptions {
    fn from(section: PoolSection) -> Self {
        PoolOptions {
            workers: section.workers,
            queue_capacity: section.queue_capacity,
            when_full: section.when_full,
            status_write_retries: section.status_write_retries,
            retry_backoff: Duration::from_millis(section.retry_backoff_ms),
        }
    }
}

/// `[task.<name>]` section: one task the runner admits at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    pub project: ProjectId,

    #[serde(default)]
    pub template: Option<TemplateId>,

    /// Run through `sh -c`.
    pub cmd: String,

    #[serde(default)]
    pub user: Option<UserId>,
}

impl TaskConfig {
    pub fn to_new_task(&self) -> NewTask {
        NewTask {
            project_id: self.project,
            template_id: self.template,
            user_id: self.user,
            params: json!({ "cmd": self.cmd }),
        }
    }
}
