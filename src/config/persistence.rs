//! Config file location, load, and save.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::types::ControllerConfig;

/// `config.json` next to the executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine executable directory"))?
        .to_path_buf();
    Ok(exe_dir.join("config.json"))
}

pub fn resolve_config_path(path: Option<&str>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(PathBuf::from(p)),
        None => default_config_path(),
    }
}

/// Load and validate the configuration. A missing file yields the defaults.
pub async fn load_config(config_path: &Path) -> Result<ControllerConfig> {
    let config = if config_path.exists() {
        let content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", config_path))?;
        let config: ControllerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", config_path))?;
        info!("Loaded configuration from: {:?}", config_path);
        config
    } else {
        warn!("Config file {:?} not found, using built-in defaults", config_path);
        ControllerConfig::default()
    };

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", config_path))?;

    Ok(config)
}

pub async fn save_config(config: &ControllerConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write config: {:?}", path))?;
    info!("Configuration saved to: {:?}", path);
    Ok(())
}
