// src/exec/backend.rs

//! Pluggable process-control abstraction.
//!
//! The supervisor talks to a `ProcessLauncher` instead of spawning commands
//! itself. Production code uses [`ShellLauncher`](super::ShellLauncher);
//! tests swap in a fake launcher whose processes exit when the test says so.

use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::Result;
use crate::types::Task;

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub success: bool,
    /// Exit code, when the platform reports one.
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl ProcessExit {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
            message: None,
        }
    }

    pub fn failure(code: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: Some(message.into()),
        }
    }
}

/// Reference to one running execution.
pub trait ProcessHandle: Send + Sync + Debug {
    /// Request termination.
    ///
    /// Must not block: returning `Ok` only means the request was delivered.
    /// The exit is observed later through [`RunningProcess::exit`].
    fn kill(&self) -> Result<()>;
}

/// A started execution: its handle plus the exit notification.
///
/// A dropped exit sender means the execution vanished without reporting;
/// the supervisor treats that as a failed run.
#[derive(Debug)]
pub struct RunningProcess {
    pub handle: Arc<dyn ProcessHandle>,
    pub exit: oneshot::Receiver<ProcessExit>,
}

/// Starts executions for tasks.
///
/// `start` is called while the task's registry entry is locked, so it must
/// return promptly: spawn the work and hand back a handle, never wait for it.
pub trait ProcessLauncher: Send + Sync {
    fn start(&self, task: &Task) -> Result<RunningProcess>;
}
