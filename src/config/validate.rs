// src/config/validate.rs

use crate::config::model::{ConfigFile, PoolSection, RawConfigFile, TaskConfig};
use crate::errors::{Result, TaskPoolError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskPoolError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_pool(&raw.pool)?;
        for (name, task) in raw.task.iter() {
            validate_task(name, task)?;
        }
        Ok(ConfigFile::new_unchecked(raw.pool, raw.task))
    }
}

fn validate_pool(pool: &PoolSection) -> Result<()> {
    if pool.workers == 0 {
        return Err(TaskPoolError::ConfigError(
            "[pool].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if pool.queue_capacity == 0 {
        return Err(TaskPoolError::ConfigError(
            "[pool].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<()> {
    if task.cmd.trim().is_empty() {
        return Err(TaskPoolError::ConfigError(format!(
            "task '{name}' has an empty `cmd`"
        )));
    }

    if task.project < 1 {
        return Err(TaskPoolError::ConfigError(format!(
            "task '{name}' has invalid project id {} (must be >= 1)",
            task.project
        )));
    }

    Ok(())
}
