//! Configuration loading traits and types.
//!
//! Provides a standardized way to load TOML configuration files across the
//! `dtsim` workspace: a `ConfigError` taxonomy, a blanket `ConfigLoader`
//! trait for any `Deserialize`-able type, and an `EngineConfig` carrying the
//! knobs the original service hard-coded (tick cadence, publish interval,
//! OPC UA operation timeout).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_OPCUA_TIMEOUT, DEFAULT_PUBLISH_INTERVAL, DEFAULT_TICK_INTERVAL};

/// Log level for configuration (mirrors `tracing::Level` without pulling it
/// into the config's serde surface).
///
/// Serializes to lowercase strings: "trace", "debug", "info", "warn", "error".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level verbosity.
    Trace,
    /// Debug-level verbosity.
    Debug,
    /// Info-level verbosity (default).
    Info,
    /// Warning-level verbosity.
    Warn,
    /// Error-level verbosity.
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive for this level.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Trait for loading configuration from TOML files.
///
/// Provides a default implementation for any type implementing
/// `serde::de::DeserializeOwned`.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if the file does not exist, or
    /// [`ConfigError::ParseError`] if the TOML is malformed or does not
    /// match `Self`'s shape.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct gets `::load`.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_publish_interval_ms() -> u64 {
    DEFAULT_PUBLISH_INTERVAL.as_millis() as u64
}

fn default_opcua_timeout_s() -> u64 {
    DEFAULT_OPCUA_TIMEOUT.as_secs()
}

/// Engine-wide configuration knobs.
///
/// The original service hard-codes the tick cadence at 1 second; this
/// struct exposes it (and the two OPC UA timing constants) as overridable
/// TOML configuration, defaulting to the original's observed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the `tracing` subscriber.
    pub log_level: LogLevel,
    /// Step loop tick cadence, in milliseconds.
    #[serde(rename = "tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// OPC UA subscription publishing interval, in milliseconds.
    #[serde(rename = "opcua_publish_interval_ms")]
    pub opcua_publish_interval_ms: u64,
    /// Bound on a single OPC UA client operation, in seconds.
    #[serde(rename = "opcua_timeout_s")]
    pub opcua_timeout_s: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            tick_interval_ms: default_tick_interval_ms(),
            opcua_publish_interval_ms: default_publish_interval_ms(),
            opcua_timeout_s: default_opcua_timeout_s(),
        }
    }
}

impl EngineConfig {
    /// The tick cadence as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The OPC UA subscription publishing interval as a [`Duration`].
    pub fn opcua_publish_interval(&self) -> Duration {
        Duration::from_millis(self.opcua_publish_interval_ms)
    }

    /// The OPC UA operation timeout as a [`Duration`].
    pub fn opcua_timeout(&self) -> Duration {
        Duration::from_secs(self.opcua_timeout_s)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `tick_interval_ms` is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_matches_reference_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tick_interval(), DEFAULT_TICK_INTERVAL);
        assert_eq!(cfg.opcua_publish_interval(), DEFAULT_PUBLISH_INTERVAL);
        assert_eq!(cfg.opcua_timeout(), DEFAULT_OPCUA_TIMEOUT);
    }

    #[test]
    fn load_missing_file_returns_file_not_found() {
        let err = EngineConfig::load(Path::new("/nonexistent/dtsim.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }

    #[test]
    fn load_parses_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms = 250\nopcua_timeout_s = 5").unwrap();
        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.tick_interval_ms, 250);
        assert_eq!(cfg.opcua_timeout_s, 5);
        assert_eq!(cfg.opcua_publish_interval_ms, default_publish_interval_ms());
    }

    #[test]
    fn validate_rejects_zero_tick_interval() {
        let cfg = EngineConfig {
            tick_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
