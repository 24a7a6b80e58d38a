pub mod config;
pub mod persist;
pub mod store;

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

pub use config::{
    AccountConfig, BackendKind, Config, ConfigStorage, LoggingConfig, StoreConfig,
    TomlConfigStorage, WatcherConfig,
};
pub use persist::BincodeClipFile;
pub use store::{ClipStore, LocalStore, QueryCallback, QuerySubscription, StoreChange, StoreError};

/// Ensure XDG data and config directories exist
/// Returns (data_dir, config_dir)
///
/// XDG Base Directory Specification:
/// - Data: $XDG_DATA_HOME/clipsync (default: ~/.local/share/clipsync)
/// - Config: $XDG_CONFIG_HOME/clipsync (default: ~/.config/clipsync)
pub fn ensure_directories() -> Result<(PathBuf, PathBuf)> {
    let home = env::var("HOME").context("HOME environment variable not set")?;
    let home_path = PathBuf::from(home);

    let data_dir = match env::var("XDG_DATA_HOME") {
        Ok(xdg_data) if !xdg_data.is_empty() => PathBuf::from(xdg_data).join("clipsync"),
        _ => home_path.join(".local/share/clipsync"),
    };

    let config_dir = match env::var("XDG_CONFIG_HOME") {
        Ok(xdg_config) if !xdg_config.is_empty() => PathBuf::from(xdg_config).join("clipsync"),
        _ => home_path.join(".config/clipsync"),
    };

    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

    log::debug!("Data directory: {:?}", data_dir);
    log::debug!("Config directory: {:?}", config_dir);

    Ok((data_dir, config_dir))
}
