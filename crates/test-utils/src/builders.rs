#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::{json, Value};
use taskpool::config::{ConfigFile, PoolSection, RawConfigFile, TaskConfig};
use taskpool::types::{NewTask, ProjectId, TemplateId, User, UserId, WhenQueueFull};

/// Builder for `NewTask`. Defaults: project 1, no template, no user,
/// `cmd = "true"`.
pub struct NewTaskBuilder {
    task: NewTask,
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            task: NewTask {
                project_id: 1,
                template_id: None,
                user_id: None,
                params: json!({ "cmd": "true" }),
            },
        }
    }

    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.task.project_id = project_id;
        self
    }

    pub fn template(mut self, template_id: TemplateId) -> Self {
        self.task.template_id = Some(template_id);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.task.user_id = Some(user_id);
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.params = json!({ "cmd": cmd });
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.task.params = params;
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn admin() -> User {
    User {
        id: 1,
        username: "admin".to_string(),
        admin: true,
    }
}

pub fn regular_user() -> User {
    User {
        id: 2,
        username: "tester".to_string(),
        admin: false,
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                pool: PoolSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.pool.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.pool.queue_capacity = capacity;
        self
    }

    pub fn when_full(mut self, when_full: WhenQueueFull) -> Self {
        self.config.pool.when_full = when_full;
        self
    }

    pub fn with_task(mut self, name: &str, project: ProjectId, cmd: &str) -> Self {
        self.config.task.insert(
            name.to_string(),
            TaskConfig {
                project,
                template: None,
                cmd: cmd.to_string(),
                user: None,
            },
        );
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
