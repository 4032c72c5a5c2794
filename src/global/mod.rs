use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "meet-agent";

/// Points the service and CLI at an alternate config file.
pub const CONFIG_ENV: &str = "MEET_AGENT_CONFIG";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    match std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join("config.toml")),
    }
}
