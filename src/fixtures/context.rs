// src/fixtures/context.rs

use std::collections::BTreeSet;

use crate::errors::{Result, TaskPoolError};
use crate::fixtures::graph::Capability;
use crate::types::{ProjectId, Task, TemplateId, UserId};

/// What a setup step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Seeded {
    /// Id of an object owned by an external collaborator.
    Id(i64),
    /// A task record created through the store.
    Task(Task),
}

/// Everything created while setting up fixtures for one test.
///
/// Each setup step reads what it needs from here and records what it
/// created; nothing lives in globals.
#[derive(Debug, Clone, Default)]
pub struct FixtureContext {
    resolved: BTreeSet<Capability>,
    user_id: Option<UserId>,
    project_id: Option<ProjectId>,
    access_key_id: Option<i64>,
    repository_id: Option<i64>,
    inventory_id: Option<i64>,
    environment_id: Option<i64>,
    template_id: Option<TemplateId>,
    task: Option<Task>,
    schedule_id: Option<i64>,
}

fn missing(cap: Capability) -> TaskPoolError {
    TaskPoolError::ConfigError(format!("fixture '{cap}' has not been resolved"))
}

impl FixtureContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self, cap: Capability) -> bool {
        self.resolved.contains(&cap)
    }

    pub fn resolved(&self) -> impl Iterator<Item = Capability> + '_ {
        self.resolved.iter().copied()
    }

    /// Store the output of the setup step for `cap`.
    pub fn record(&mut self, cap: Capability, seeded: Seeded) -> Result<()> {
        let id = match (&seeded, cap) {
            (Seeded::Task(task), Capability::Task) => {
                self.task = Some(task.clone());
                None
            }
            (Seeded::Id(id), cap) if cap != Capability::Task => Some(*id),
            _ => {
                return Err(TaskPoolError::ConfigError(format!(
                    "setup step for '{cap}' produced {seeded:?}"
                )));
            }
        };

        if let Some(id) = id {
            let slot = match cap {
                Capability::User => &mut self.user_id,
                Capability::Project => &mut self.project_id,
                Capability::AccessKey => &mut self.access_key_id,
                Capability::Repository => &mut self.repository_id,
                Capability::Inventory => &mut self.inventory_id,
                Capability::Environment => &mut self.environment_id,
                Capability::Template => &mut self.template_id,
                Capability::Schedule => &mut self.schedule_id,
                Capability::Task => unreachable!("task ids are recorded as Seeded::Task"),
            };
            *slot = Some(id);
        }

        self.resolved.insert(cap);
        Ok(())
    }

    pub fn user_id(&self) -> Result<UserId> {
        self.user_id.ok_or_else(|| missing(Capability::User))
    }

    pub fn project_id(&self) -> Result<ProjectId> {
        self.project_id.ok_or_else(|| missing(Capability::Project))
    }

    pub fn access_key_id(&self) -> Result<i64> {
        self.access_key_id.ok_or_else(|| missing(Capability::AccessKey))
    }

    pub fn repository_id(&self) -> Result<i64> {
        self.repository_id.ok_or_else(|| missing(Capability::Repository))
    }

    pub fn inventory_id(&self) -> Result<i64> {
        self.inventory_id.ok_or_else(|| missing(Capability::Inventory))
    }

    pub fn environment_id(&self) -> Result<i64> {
        self.environment_id.ok_or_else(|| missing(Capability::Environment))
    }

    pub fn template_id(&self) -> Result<TemplateId> {
        self.template_id.ok_or_else(|| missing(Capability::Template))
    }

    pub fn task(&self) -> Result<&Task> {
        self.task.as_ref().ok_or_else(|| missing(Capability::Task))
    }

    pub fn schedule_id(&self) -> Result<i64> {
        self.schedule_id.ok_or_else(|| missing(Capability::Schedule))
    }
}
