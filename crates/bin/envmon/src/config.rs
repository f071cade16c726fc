//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `envmon.toml` in the working directory, or the file named by
//! `ENVMON_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use envsensor_adapter_ble::BleConfig;
use envsensor_adapter_virtual::VirtualConfig;
use envsensor_app::session::SessionTimeouts;
use envsensor_domain::filter::{AdvertisementFilter, SENSOR_LOCAL_NAME};

const DEFAULT_PATH: &str = "envmon.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which advertisements to connect to.
    pub scan: ScanConfig,
    /// Session deadlines.
    pub session: SessionConfig,
    /// Transport selection.
    pub transport: TransportConfig,
    /// btleplug transport settings.
    pub ble: BleConfig,
    /// Simulated sensor settings.
    #[serde(rename = "virtual")]
    pub simulator: VirtualConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Console output settings.
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Exact advertised local name to connect to.
    pub device_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connect_timeout_secs: u64,
    pub setup_timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
}

/// Where advertisements and links come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// The host BLE adapter via btleplug.
    #[default]
    Ble,
    /// The simulated sensor.
    Virtual,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ble" => Ok(Self::Ble),
            "virtual" => Ok(Self::Virtual),
            other => Err(ConfigError::Validation(format!(
                "unknown transport `{other}` (expected `ble` or `virtual`)"
            ))),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unknown output format `{other}` (expected `text` or `json`)"
            ))),
        }
    }
}

impl Config {
    /// Load configuration from `envmon.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("ENVMON_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("ENVMON_DEVICE_NAME") {
            self.scan.device_name = val;
        }
        if let Some(val) = lookup("ENVMON_TRANSPORT") {
            self.transport.kind = val.parse()?;
        }
        if let Some(val) = lookup("ENVMON_FORMAT") {
            self.output.format = val.parse()?;
        }
        if let Some(val) = lookup("ENVMON_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.device_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "scan.device_name must not be empty".to_string(),
            ));
        }
        if self.session.connect_timeout_secs == 0 || self.session.setup_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "session timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn filter(&self) -> AdvertisementFilter {
        AdvertisementFilter::new(self.scan.device_name.clone())
    }

    #[must_use]
    pub fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect: Duration::from_secs(self.session.connect_timeout_secs),
            setup: Duration::from_secs(self.session.setup_timeout_secs),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            device_name: SENSOR_LOCAL_NAME.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            setup_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "envmon=info,envsensor_app=info,envsensor_adapter_ble=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
