// src/fixtures/resolver.rs

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::errors::Result;
use crate::fixtures::context::{FixtureContext, Seeded};
use crate::fixtures::graph::{Capability, CapabilityGraph};
use crate::store::TaskStore;
use crate::types::{NewTask, TaskStatus};

/// A setup step implementation: creates the object behind one capability.
///
/// Called only after every dependency of `cap` is recorded in `ctx`.
pub trait Seeder {
    fn seed(&mut self, cap: Capability, ctx: &FixtureContext) -> Result<Seeded>;
}

/// Resolves capabilities against a [`CapabilityGraph`].
#[derive(Debug, Clone)]
pub struct FixtureResolver {
    graph: CapabilityGraph,
}

impl Default for FixtureResolver {
    fn default() -> Self {
        Self::new(CapabilityGraph::standard())
    }
}

impl FixtureResolver {
    pub fn new(graph: CapabilityGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &CapabilityGraph {
        &self.graph
    }

    /// Make sure every requested capability (and its dependencies) is
    /// present in `ctx`, seeding only what is missing.
    ///
    /// Returns the capabilities seeded by this call, in seeding order.
    pub fn resolve<S: Seeder>(
        &self,
        ctx: &mut FixtureContext,
        requested: &[Capability],
        seeder: &mut S,
    ) -> Result<Vec<Capability>> {
        let mut seeded = Vec::new();

        for cap in self.graph.resolution_order(requested)? {
            if ctx.is_resolved(cap) {
                continue;
            }
            let output = seeder.seed(cap, ctx)?;
            ctx.record(cap, output)?;
            debug!(capability = %cap, "fixture resolved");
            seeded.push(cap);
        }

        Ok(seeded)
    }
}

/// Seeder backed by a [`TaskStore`].
///
/// External objects (users, projects, templates, ...) get fresh ids from a
/// counter; `task` creates a real `waiting` record in the store for the
/// context's project and template.
#[derive(Debug)]
pub struct StoreSeeder {
    store: Arc<dyn TaskStore>,
    next_id: i64,
}

impl StoreSeeder {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store, next_id: 0 }
    }
}

impl Seeder for StoreSeeder {
    fn seed(&mut self, cap: Capability, ctx: &FixtureContext) -> Result<Seeded> {
        if cap == Capability::Task {
            let task = self.store.create_task(
                NewTask {
                    project_id: ctx.project_id()?,
                    template_id: Some(ctx.template_id()?),
                    user_id: ctx.user_id().ok(),
                    params: json!({ "cmd": "true" }),
                },
                TaskStatus::Waiting,
            )?;
            return Ok(Seeded::Task(task));
        }

        self.next_id += 1;
        Ok(Seeded::Id(self.next_id))
    }
}
