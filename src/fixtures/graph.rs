// src/fixtures/graph.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, TaskPoolError};

/// Something a fixture setup step can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    User,
    Project,
    AccessKey,
    Repository,
    Inventory,
    Environment,
    Template,
    Task,
    Schedule,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::User,
        Capability::Project,
        Capability::AccessKey,
        Capability::Repository,
        Capability::Inventory,
        Capability::Environment,
        Capability::Template,
        Capability::Task,
        Capability::Schedule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::User => "user",
            Capability::Project => "project",
            Capability::AccessKey => "access_key",
            Capability::Repository => "repository",
            Capability::Inventory => "inventory",
            Capability::Environment => "environment",
            Capability::Template => "template",
            Capability::Task => "task",
            Capability::Schedule => "schedule",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("unknown capability: {s}"))
    }
}

/// Directed acyclic graph of capabilities.
///
/// Edge direction: dependency -> dependent. For `template` depending on
/// `repository` we store `repository -> template`.
#[derive(Debug, Clone)]
pub struct CapabilityGraph {
    graph: DiGraphMap<Capability, ()>,
}

impl CapabilityGraph {
    /// Build a graph from `(capability, dependencies)` pairs.
    ///
    /// Fails if a capability depends on itself or the edges form a cycle.
    pub fn from_dependencies(deps: &[(Capability, &[Capability])]) -> Result<Self> {
        for (cap, needs) in deps {
            if needs.contains(cap) {
                return Err(TaskPoolError::ConfigError(format!(
                    "capability '{cap}' cannot depend on itself"
                )));
            }
        }

        let graph = Self::build(deps);

        match toposort(&graph.graph, None) {
            Ok(_) => Ok(graph),
            Err(cycle) => Err(TaskPoolError::ConfigError(format!(
                "cycle detected in capability graph involving '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// The fixture graph of the task API test suite.
    pub fn standard() -> Self {
        use Capability::*;

        Self::build(&[
            (User, &[]),
            (Project, &[User]),
            (AccessKey, &[Project]),
            (Repository, &[AccessKey]),
            (Inventory, &[Repository]),
            (Environment, &[Repository]),
            (Template, &[Repository, Inventory, Environment]),
            (Task, &[Template]),
            (Schedule, &[Template]),
        ])
    }

    fn build(deps: &[(Capability, &[Capability])]) -> Self {
        let mut graph = DiGraphMap::new();
        for (cap, needs) in deps {
            graph.add_node(*cap);
            for dep in needs.iter() {
                graph.add_edge(*dep, *cap, ());
            }
        }
        Self { graph }
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.graph.nodes()
    }

    /// Direct dependencies of `cap`.
    pub fn dependencies_of(&self, cap: Capability) -> Vec<Capability> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(cap, Direction::Incoming)
            .collect();
        deps.sort();
        deps
    }

    /// Direct dependents of `cap`.
    pub fn dependents_of(&self, cap: Capability) -> Vec<Capability> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(cap, Direction::Outgoing)
            .collect();
        deps.sort();
        deps
    }

    /// `requested` plus everything they transitively need, dependencies
    /// first.
    pub fn resolution_order(&self, requested: &[Capability]) -> Result<Vec<Capability>> {
        let mut needed = BTreeSet::new();
        let mut stack: Vec<Capability> = requested.to_vec();

        while let Some(cap) = stack.pop() {
            if !self.graph.contains_node(cap) {
                return Err(TaskPoolError::ConfigError(format!(
                    "capability '{cap}' is not part of the graph"
                )));
            }
            if needed.insert(cap) {
                stack.extend(self.graph.neighbors_directed(cap, Direction::Incoming));
            }
        }

        let order = toposort(&self.graph, None).map_err(|cycle| {
            TaskPoolError::ConfigError(format!(
                "cycle detected in capability graph involving '{}'",
                cycle.node_id()
            ))
        })?;

        Ok(order.into_iter().filter(|c| needed.contains(c)).collect())
    }
}
