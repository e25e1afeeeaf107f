//! Configuration file management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use types::{NativeLogLevel, Timeout};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Default tracing filter, overridden by `RUST_LOG`
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsbSettings {
    /// Verbosity of the native stack's own logging
    #[serde(default)]
    pub native_log_level: NativeLogLevel,
    /// Enable kernel driver auto-detach on every opened handle
    #[serde(default)]
    pub auto_detach_kernel_driver: bool,
    /// Default transfer timeout in milliseconds (0 = wait indefinitely)
    #[serde(default)]
    pub default_timeout_ms: u64,
}

impl UsbSettings {
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from_millis(self.default_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// `~` and environment variables in the path are expanded.
    pub fn load(path: impl AsRef<str>) -> Result<Self> {
        let expanded = shellexpand::full(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to expand path: {}", e)))?;
        let config_path = PathBuf::from(expanded.as_ref());

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load the default configuration file, falling back to defaults
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path.to_string_lossy()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-host").join("config.toml")
        } else {
            PathBuf::from(".config/usb-host/config.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("Empty log level".to_string()));
        }
        crate::logging::parse_filter(&self.logging.level)?;
        Ok(())
    }
}
