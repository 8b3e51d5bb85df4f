// src/errors.rs

//! Crate-wide error type and the HTTP status mapping the API layer applies.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskPoolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Process control error for task {task_id}: {message}")]
    ProcessControl { task_id: TaskId, message: String },

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Admission queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Admission queue is closed")]
    QueueClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskPoolError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            TaskPoolError::Validation(_) | TaskPoolError::Conflict(_) => 400,
            TaskPoolError::Unauthorized(_) => 401,
            TaskPoolError::NotFound(_) => 404,
            TaskPoolError::QueueFull { .. } | TaskPoolError::QueueClosed => 503,
            TaskPoolError::Persistence(_)
            | TaskPoolError::ProcessControl { .. }
            | TaskPoolError::ConfigError(_)
            | TaskPoolError::IoError(_)
            | TaskPoolError::TomlError(_)
            | TaskPoolError::Other(_) => 500,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskPoolError>;
