//! Configuration loading and data folder resolution
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging section shared by every TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolves config file and data folder locations for one application
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    app_name: String,
}

impl ConfigResolver {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Locate the TOML config file, if any.
    ///
    /// An explicit CLI or ENV path is returned even when it does not exist so
    /// the caller can report it; platform locations are only returned if present.
    pub fn config_file(&self, cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(env_var_name) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.platform_config_candidates()
            .into_iter()
            .find(|candidate| candidate.exists())
    }

    /// Resolve the folder holding persisted collections
    pub fn data_folder(
        &self,
        cli_arg: Option<&Path>,
        env_var_name: &str,
        toml_value: Option<&Path>,
    ) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(env_var_name) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = toml_value {
            return path.to_path_buf();
        }

        self.default_data_folder()
    }

    /// OS-dependent default data folder
    pub fn default_data_folder(&self) -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join(&self.app_name))
            .unwrap_or_else(|| PathBuf::from(format!("./{}_data", self.app_name.replace('-', "_"))))
    }

    fn platform_config_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(&self.app_name).join("config.toml"));
        }
        if cfg!(unix) {
            candidates.push(PathBuf::from("/etc").join(&self.app_name).join("config.toml"));
        }
        candidates
    }
}

/// Load a TOML config file into `T`.
///
/// A missing file is not fatal: a warning is logged and defaults are used.
/// A file that exists but cannot be read or parsed is a configuration error.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!("Config file {} does not exist, using compiled defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}
