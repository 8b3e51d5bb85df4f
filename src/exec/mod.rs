// src/exec/mod.rs

//! Process control collaborator.
//!
//! The engine never touches OS processes directly. It asks a
//! [`ProcessLauncher`] to start a task and gets back a [`RunningProcess`]:
//! a [`ProcessHandle`] that can deliver a kill request, plus a one-shot exit
//! notification.
//!
//! - [`backend`] defines the traits and the exit types.
//! - [`task_runner`] provides [`ShellLauncher`], which runs `params.cmd`
//!   through the platform shell with `tokio::process`.

pub mod backend;
pub mod task_runner;

pub use backend::{ProcessExit, ProcessHandle, ProcessLauncher, RunningProcess};
pub use task_runner::ShellLauncher;
