// src/engine/mod.rs

//! Task lifecycle engine.
//!
//! This module ties together:
//! - the active task registry (per-task exclusive sections)
//! - the admission queue (bounded FIFO of admitted task ids)
//! - the supervisor workers that start, watch and settle executions
//! - the lifecycle API (admit, query, stop, remove)
//!
//! [`TaskPool`] wires all of them around a store and a process launcher.

use std::time::Duration;

use crate::types::WhenQueueFull;

/// Tunables for a [`TaskPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Number of supervisor workers, i.e. how many tasks may execute at once.
    pub workers: usize,
    /// Admission queue capacity.
    pub queue_capacity: usize,
    /// What `admit` does when the queue is full.
    pub when_full: WhenQueueFull,
    /// Extra attempts for a failed terminal status write before it is parked
    /// for reconciliation.
    pub status_write_retries: u32,
    /// Base delay between those attempts (grows linearly).
    pub retry_backoff: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 256,
            when_full: WhenQueueFull::Wait,
            status_write_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

pub(crate) mod core;
pub mod lifecycle;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod supervisor;

pub use lifecycle::{Admission, LifecycleManager, StopOutcome, StopReport};
pub use pool::{TaskPool, TaskPoolBuilder};
pub use queue::{AdmissionQueue, AdmissionReceiver, AdmissionSlot};
pub use registry::{ActiveRegistry, ActiveSnapshot, ActiveTask, EntryState};
pub use supervisor::{PromoteHook, Supervisor};
