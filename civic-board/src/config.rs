//! civic-board configuration
//!
//! Every field has a compiled default, so a missing TOML file still yields a
//! runnable (offline-capable) board. CLI flags and environment variables are
//! layered on top by [`BoardConfig::apply_overrides`].

use civic_common::config::{load_toml_or_default, ConfigResolver, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::users::Role;

pub const APP_NAME: &str = "civic-board";
pub const CONFIG_ENV: &str = "CIVIC_BOARD_CONFIG";
pub const DATA_DIR_ENV: &str = "CIVIC_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("CivicBoard/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
        }
    }
}

/// One bearer token accepted by the static identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Role given to the profile when it is first provisioned
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub tokens: Vec<TokenGrant>,
}

/// Full TOML schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Directory holding the single-page client; API-only when unset
    pub static_dir: Option<PathBuf>,
    pub flush_debounce_ms: u64,
    pub polling_recommended_ms: u64,
    pub logging: LoggingConfig,
    pub geocoding: GeocodingConfig,
    pub identity: IdentityConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 5050,
            data_dir: None,
            static_dir: None,
            flush_debounce_ms: 350,
            polling_recommended_ms: 4000,
            logging: LoggingConfig::default(),
            geocoding: GeocodingConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub offline: bool,
}

impl BoardConfig {
    /// Locate, load and override the configuration
    pub fn resolve(overrides: &Overrides) -> civic_common::Result<Self> {
        let resolver = ConfigResolver::new(APP_NAME);
        let path = resolver.config_file(overrides.config_path.as_deref(), CONFIG_ENV);
        let mut config: BoardConfig = load_toml_or_default(path.as_deref())?;
        config.apply_overrides(&resolver, overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, resolver: &ConfigResolver, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.offline {
            self.geocoding.enabled = false;
        }
        self.data_dir = Some(resolver.data_folder(
            overrides.data_dir.as_deref(),
            DATA_DIR_ENV,
            self.data_dir.as_deref(),
        ));
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| ConfigResolver::new(APP_NAME).default_data_folder())
    }

    pub fn static_dir(&self) -> Option<&Path> {
        self.static_dir.as_deref()
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
