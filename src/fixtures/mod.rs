// src/fixtures/mod.rs

//! Test-fixture setup driven by a capability dependency graph.
//!
//! - [`graph`] holds the capability DAG (`template` needs `repository`,
//!   `inventory` and `environment`, and so on) and computes resolution order.
//! - [`context`] is the explicit fixture context that owns everything the
//!   setup steps create.
//! - [`resolver`] walks the graph and runs each setup step at most once per
//!   context.

pub mod context;
pub mod graph;
pub mod resolver;

pub use context::{FixtureContext, Seeded};
pub use graph::{Capability, CapabilityGraph};
pub use resolver::{FixtureResolver, Seeder, StoreSeeder};
