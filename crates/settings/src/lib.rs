//! StakePool Settings
//!
//! Generic JSON config file management. Each service defines its own config
//! type and wraps it in `Settings<T>`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    NotFound(String),
    #[error("Failed to read settings: {0}")]
    ReadError(String),
    #[error("Failed to write settings: {0}")]
    WriteError(String),
    #[error("Failed to parse settings: {0}")]
    ParseError(String),
    #[error("Failed to create directory: {0}")]
    CreateDirError(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Generic settings wrapper for any serializable config type.
///
/// ```ignore
/// let settings: Settings<RawConfig> = Settings::load_or_default("stakepool", None)?;
/// ```
pub struct Settings<T> {
    pub config: T,
    path: PathBuf,
}

impl<T: Serialize + DeserializeOwned> Settings<T> {
    /// Load settings from an explicit path that must exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.display().to_string()));
        }
        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError(e.to_string()))?;
        let config: T = serde_json::from_str(&content).map_err(|e| SettingsError::ParseError(e.to_string()))?;
        Ok(Self {
            config,
            path: path.to_path_buf(),
        })
    }

    /// Save current settings to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::CreateDirError(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(&self.config).map_err(|e| SettingsError::WriteError(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| SettingsError::WriteError(e.to_string()))
    }

    /// Get the path where settings are stored.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize + DeserializeOwned + Default> Settings<T> {
    /// Load settings from the default path for a service, or create defaults.
    pub fn load_or_default(service: &str, custom_path: Option<&Path>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.to_path_buf(),
            None => default_settings_path(service),
        };

        if path.exists() {
            Self::load(&path)
        } else {
            debug!("Creating default settings at {}", path.display());
            let settings = Self {
                config: T::default(),
                path,
            };
            settings.save()?;
            Ok(settings)
        }
    }
}

/// Per-service config directory: `$XDG_CONFIG_HOME/<service>` or
/// `~/.config/<service>`.
pub fn default_config_dir_for(service: &str) -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(service.to_lowercase())
}

/// Get the default settings file path for a service.
pub fn default_settings_path(service: &str) -> PathBuf {
    default_config_dir_for(service).join("settings.json")
}
