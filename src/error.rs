//! Custom error types for the test bench.
//!
//! `BenchError` is the single error type of the library. It is built with
//! `thiserror`, and `#[from]` conversions let the `?` operator lift I/O and
//! configuration failures into it directly.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading or extracting the
//!   configuration (bad TOML, wrong types, bad environment overrides).
//! - **`Configuration`**: Semantic errors caught by `BenchConfig::validate`,
//!   such as an unsupported baud rate or an empty frame marker.
//! - **`Io`**: Wraps `std::io::Error` for file and stream failures.
//! - **`Serial`**: Failures opening or talking to a serial port.
//! - **`Storage`**: Failures writing the CSV row or the capture log.
//! - **`Serialization`**: Failures rendering a result as JSON.
//! - **`SerialFeatureDisabled`** / **`FeatureNotEnabled`**: The requested
//!   functionality was compiled out via feature flags.

use thiserror::Error;

/// Convenience alias for results using the bench error type.
pub type AppResult<T> = std::result::Result<T, BenchError>;

/// Errors produced by the test bench library.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error on '{port}': {message}")]
    Serial { port: String, message: String },

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<BenchError>),
}

impl BenchError {
    /// Whether the reader loop can keep going after this error.
    ///
    /// Storage failures only lose one row; everything else means the
    /// link or the process is in a bad state.
    pub fn can_recover(&self) -> bool {
        matches!(self, BenchError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_recoverable() {
        assert!(BenchError::Storage("disk full".into()).can_recover());
        assert!(!BenchError::SerialFeatureDisabled.can_recover());
        assert!(!BenchError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).can_recover());
    }

    #[test]
    fn serial_error_names_the_port() {
        let err = BenchError::Serial {
            port: "/dev/ttyUSB0".into(),
            message: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyUSB0"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))?;
            Ok(())
        }
        match fails() {
            Err(BenchError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
