//! Monitor configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RMSERIAL_CONFIG)
//! 3. Environment variables

use rmserial_link::LinkConfig;
use rmserial_protocol::{DEFAULT_MAX_PAYLOAD, MAX_PAYLOAD_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device configuration.
    pub device: DeviceConfig,
    /// Link configuration.
    pub link: LinkSection,
    /// Monitor output configuration.
    pub monitor: MonitorConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("RMSERIAL_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.device.apply_env_overrides();
        self.link.apply_env_overrides();
        self.monitor.apply_env_overrides();
    }

    /// Checks values that cannot be clamped into range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.path must not be empty".to_string(),
            ));
        }
        if self.link.max_payload == 0 {
            return Err(ConfigError::ValidationError(
                "link.max_payload must be at least 1".to_string(),
            ));
        }
        if self.link.max_payload > MAX_PAYLOAD_LIMIT as u32 {
            return Err(ConfigError::ValidationError(format!(
                "link.max_payload {} exceeds {}",
                self.link.max_payload, MAX_PAYLOAD_LIMIT
            )));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Serial device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Path of the already-configured serial device.
    pub path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/ttyACM0"),
        }
    }
}

impl DeviceConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RMSERIAL_DEVICE") {
            self.path = PathBuf::from(path);
        }
    }
}

/// Link section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
    /// Largest accepted payload length. Wider than `u16` so `validate` can
    /// report out-of-range values instead of failing the parse.
    pub max_payload: u32,
    /// Idle period in milliseconds after which the monitor warns that no
    /// data arrived (0 = disabled).
    pub read_timeout_ms: u64,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            read_buffer_size: rmserial_link::config::DEFAULT_READ_BUFFER_SIZE,
            max_payload: DEFAULT_MAX_PAYLOAD as u32,
            read_timeout_ms: 0,
        }
    }
}

impl LinkSection {
    fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("RMSERIAL_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }

        if let Ok(max) = std::env::var("RMSERIAL_MAX_PAYLOAD") {
            if let Ok(n) = max.parse() {
                self.max_payload = n;
            }
        }

        if let Ok(timeout) = std::env::var("RMSERIAL_READ_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.read_timeout_ms = ms;
            }
        }
    }

    /// Builds the link configuration. Call after `Config::validate`.
    pub fn to_link_config(&self) -> LinkConfig {
        let max_payload = self.max_payload.min(MAX_PAYLOAD_LIMIT as u32) as u16;
        let mut config = LinkConfig::new()
            .with_read_buffer_size(self.read_buffer_size)
            .with_max_payload(max_payload);
        if self.read_timeout_ms > 0 {
            config = config.with_read_timeout(Duration::from_millis(self.read_timeout_ms));
        }
        config
    }
}

/// Monitor output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between statistics log lines in seconds (0 = disabled).
    pub stats_interval_secs: u64,
    /// Log payload bytes as hex with every frame.
    pub hex_dump: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: 30,
            hex_dump: false,
        }
    }
}

impl MonitorConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(interval) = std::env::var("RMSERIAL_STATS_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.stats_interval_secs = secs;
            }
        }
    }

    /// Returns the stats interval, or `None` when periodic stats are disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
