//! Bench configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. built-in defaults ([`BenchConfig::default`]),
//! 2. a TOML file (`config/bench.toml` unless another path is given; a
//!    missing file is not an error),
//! 3. environment variables prefixed with `AM60_BENCH_`, using `__` between
//!    nested keys.
//!
//! # Example
//! ```no_run
//! use am60_bench::config::BenchConfig;
//!
//! let config = BenchConfig::load()?;
//! config.validate()?;
//! println!("CSV output: {}", config.storage.csv_path.display());
//! # Ok::<(), am60_bench::error::BenchError>(())
//! ```
//!
//! Environment override example:
//! `AM60_BENCH_DEVICE__BAUD_RATE=9600 AM60_BENCH_APPLICATION__LOG_LEVEL=debug`

use crate::diagnostics::{DiagnosticRule, DiagnosticTable};
use crate::error::{AppResult, BenchError};
use crate::framing::{DEFAULT_MAX_BUFFER_BYTES, DEFAULT_START_MARKER, DEFAULT_STOP_MARKER};
use crate::ports::DEFAULT_BAUD_RATE;
use crate::record::Column;
use crate::validation;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/bench.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AM60_BENCH_";

/// Top-level bench configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Link to the unit under test
    pub device: DeviceConfig,
    /// Optional barcode scanner link
    pub scanner: ScannerConfig,
    /// Message framing
    pub framing: FramingConfig,
    /// Output files
    pub storage: StorageConfig,
    /// Unit verdict
    pub status: StatusConfig,
    /// Additional diagnostic sentences
    pub diagnostics: Vec<DiagnosticRule>,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "AM60 Test Bench".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Serial link to the unit under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: Option<String>,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout in milliseconds; a pending partial line is flushed when it expires
    pub read_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Serial barcode scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Whether to read serial numbers from a scanner
    pub enabled: bool,
    /// Serial port path of the scanner
    pub port: Option<String>,
    /// Baud rate of the scanner
    pub baud_rate: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Frame marker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Literal text opening a message
    pub start_marker: String,
    /// Literal text closing a message
    pub stop_marker: String,
    /// Upper bound on text buffered while waiting for a stop marker
    pub max_buffer_bytes: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER.to_string(),
            stop_marker: DEFAULT_STOP_MARKER.to_string(),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// CSV file rewritten with the latest result
    pub csv_path: PathBuf,
    /// Text file holding the latest raw message; empty disables it
    pub capture_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("AM60.csv"),
            capture_path: Some(PathBuf::from("captured_messages.txt")),
        }
    }
}

/// Unit verdict configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Pass/fail columns that must all read "1" for a GOOD unit
    pub fields: Vec<Column>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            fields: Column::DEFAULT_STATUS_FIELDS.to_vec(),
        }
    }
}

impl StorageConfig {
    /// Capture log path, `None` when unset or empty.
    pub fn capture_path(&self) -> Option<&Path> {
        self.capture_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

// Default value functions
fn default_read_timeout_ms() -> u64 {
    1000
}

impl BenchConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider stack, exposed for callers that merge CLI flags on top.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(BenchConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| -> AppResult<()> { Err(BenchError::Configuration(msg)) };

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if let Err(e) = validation::is_supported_baud(self.device.baud_rate) {
            return invalid(format!("device.baud_rate {}: {}", self.device.baud_rate, e));
        }
        if self.device.read_timeout_ms == 0 {
            return invalid("device.read_timeout_ms must be greater than 0".to_string());
        }
        if let Some(port) = &self.device.port {
            if let Err(e) = validation::is_not_empty(port) {
                return invalid(format!("device.port: {}", e));
            }
        }

        if self.scanner.enabled {
            if let Err(e) = validation::is_supported_baud(self.scanner.baud_rate) {
                return invalid(format!(
                    "scanner.baud_rate {}: {}",
                    self.scanner.baud_rate, e
                ));
            }
            match &self.scanner.port {
                Some(port) if validation::is_not_empty(port).is_ok() => {}
                _ => return invalid("scanner.port is required when the scanner is enabled".into()),
            }
            if self.scanner.port == self.device.port {
                return invalid("scanner.port must differ from device.port".to_string());
            }
        }

        if let Err(e) =
            validation::is_valid_marker_pair(&self.framing.start_marker, &self.framing.stop_marker)
        {
            return invalid(format!("framing: {}", e));
        }

        if let Err(e) = validation::is_valid_path(&self.storage.csv_path.to_string_lossy()) {
            return invalid(format!("storage.csv_path: {}", e));
        }
        if let Some(capture) = self.storage.capture_path() {
            if let Err(e) = validation::is_valid_path(&capture.to_string_lossy()) {
                return invalid(format!("storage.capture_path: {}", e));
            }
        }

        if self.status.fields.is_empty() {
            return invalid("status.fields cannot be empty".to_string());
        }
        if let Some(column) = self.status.fields.iter().find(|c| !c.is_pass_fail()) {
            return invalid(format!(
                "status.fields: '{}' is not a pass/fail column",
                column
            ));
        }

        for rule in &self.diagnostics {
            if let Err(e) = validation::is_not_empty(&rule.sentence) {
                return invalid(format!("diagnostics sentence: {}", e));
            }
            if !rule.column.is_pass_fail() {
                return invalid(format!(
                    "diagnostics '{}': '{}' is not a pass/fail column",
                    rule.sentence, rule.column
                ));
            }
        }

        Ok(())
    }

    /// Built-in diagnostic sentences merged with the configured ones.
    pub fn diagnostic_table(&self) -> DiagnosticTable {
        DiagnosticTable::with_rules(&self.diagnostics)
    }
}
