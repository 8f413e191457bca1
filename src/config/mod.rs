//! Configuration module for PlotMirror-RS
//!
//! This module holds the settings the connection supervisor and the published
//! interface need: where the data server lives, where our own interface is
//! served, how often liveness is probed and the well-known object names.
//!
//! # Config Location
//!
//! The config file is stored in the platform-appropriate location:
//! - **Linux**: `~/.config/dev.plotmirror.plotmirror-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.plotmirror.plotmirror-rs/config.toml`
//! - **Windows**: `%APPDATA%\dev.plotmirror.plotmirror-rs\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use plotmirror_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default();
//! config.liveness.interval_ms = 1000;
//! if let Some(path) = plotmirror_rs::config::config_path() {
//!     config.save(path)?;
//! }
//! ```

use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "dev.plotmirror.plotmirror-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default data server port
pub const DEFAULT_DATASERVER_PORT: u16 = 55556;

/// Default port for the published interface
pub const DEFAULT_PUBLISH_PORT: u16 = 55563;

/// Default liveness probe interval in milliseconds
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 500;

/// Default liveness probe reply bound in milliseconds
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 50;

// ==================== Config Directory ====================

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Endpoints ====================

/// A TCP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Render as a transport URL, e.g. `tcp://127.0.0.1:55556`
    pub fn url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

// ==================== Liveness ====================

/// Liveness probe timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Interval between probes
    pub interval_ms: u64,
    /// Reply bound for a single probe
    pub timeout_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_LIVENESS_INTERVAL_MS,
            timeout_ms: DEFAULT_LIVENESS_TIMEOUT_MS,
        }
    }
}

impl LivenessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ==================== Object Names ====================

/// Well-known names objects are resolved/published under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectNames {
    /// Remote data server object
    pub dataserver: String,
    /// Our own published interface
    pub interface: String,
}

impl Default for ObjectNames {
    fn default() -> Self {
        Self {
            dataserver: "dataserver".to_string(),
            interface: "plotwin".to_string(),
        }
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the data server session is established
    #[serde(default = "default_dataserver")]
    pub dataserver: EndpointConfig,

    /// Where our interface is served
    #[serde(default = "default_publish")]
    pub publish: EndpointConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub names: ObjectNames,
}

fn default_dataserver() -> EndpointConfig {
    EndpointConfig::new("127.0.0.1", DEFAULT_DATASERVER_PORT)
}

fn default_publish() -> EndpointConfig {
    EndpointConfig::new("127.0.0.1", DEFAULT_PUBLISH_PORT)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataserver: default_dataserver(),
            publish: default_publish(),
            liveness: LivenessConfig::default(),
            names: ObjectNames::default(),
        }
    }
}

impl AppConfig {
    /// Load a config file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            MirrorError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| MirrorError::Config(format!("Failed to parse config {:?}: {}", path, e)))
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MirrorError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MirrorError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MirrorError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.dataserver.url(), "tcp://127.0.0.1:55556");
        assert_eq!(config.publish.port, DEFAULT_PUBLISH_PORT);
        assert_eq!(config.liveness.interval(), Duration::from_millis(500));
        assert_eq!(config.liveness.timeout(), Duration::from_millis(50));
        assert_eq!(config.names.dataserver, "dataserver");
        assert_eq!(config.names.interface, "plotwin");
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.dataserver = EndpointConfig::new("10.0.0.2", 6000);
        config.liveness.interval_ms = 1000;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[liveness]\ninterval_ms = 250\ntimeout_ms = 20\n").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.liveness.interval_ms, 250);
        assert_eq!(loaded.dataserver, AppConfig::default().dataserver);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "this is = = not toml").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }
}
