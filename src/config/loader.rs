// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a TOML config without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and validate it.
///
/// - Reads TOML.
/// - Applies defaults (`serde` + `Default` impls).
/// - Checks pool tunables and every `[task.<name>]` entry.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Taskpool.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskpool.toml")
}
