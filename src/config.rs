//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below. A minimal file looks like:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [storage]
//! csv_dir = "CSV Files"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{GroundStationError, Result};

/// Baud rates offered by the downlink radio
pub const SUPPORTED_BAUD_RATES: &[u32] = &[1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path; may be left empty and supplied on the command line
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Pause before reading the same port again after a transport error
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// CSV storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Live telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; stderr only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_baud_rate() -> u32 { 9600 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_retry_backoff_ms() -> u64 { 1000 }

fn default_csv_dir() -> String { "CSV Files".to_string() }
fn default_file_prefix() -> String { "flight".to_string() }

fn default_history_capacity() -> usize { 15 }
fn default_max_line_length() -> usize { 512 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_dir: default_csv_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            max_line_length: default_max_line_length(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Backoff after a transport error as a `Duration`
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn invalid(msg: impl Into<String>) -> GroundStationError {
    GroundStationError::Config(msg.into())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_station::config::Config;
    ///
    /// let config = Config::load("ground-station.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                SUPPORTED_BAUD_RATES
                    .iter()
                    .map(|b| b.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        // Bounded so stop() is observed promptly
        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > 1000 {
            return Err(invalid("read_timeout_ms must be between 1 and 1000"));
        }

        if self.serial.retry_backoff_ms == 0 || self.serial.retry_backoff_ms > 60000 {
            return Err(invalid("retry_backoff_ms must be between 1 and 60000"));
        }

        if self.storage.csv_dir.is_empty() {
            return Err(invalid("csv_dir cannot be empty"));
        }

        if self.storage.file_prefix.is_empty()
            || self.storage.file_prefix.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(invalid("file_prefix must be a non-empty file name without separators"));
        }

        if self.telemetry.history_capacity == 0 || self.telemetry.history_capacity > 10000 {
            return Err(invalid("history_capacity must be between 1 and 10000"));
        }

        if self.telemetry.max_line_length < 16 || self.telemetry.max_line_length > 65536 {
            return Err(invalid("max_line_length must be between 16 and 65536"));
        }

        if self.logging.level.is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}
