//! Result persistence.
//!
//! The line PC only ever needs the latest unit: every new record truncates
//! the CSV file and rewrites it as a header plus one data row. The raw
//! message is kept the same way in a capture text file.
use crate::error::{AppResult, BenchError};
use crate::framing::Frame;
use crate::record::TestRecord;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A destination for completed results.
pub trait RecordSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Persists one result.
    fn write(&mut self, frame: &Frame, record: &TestRecord) -> AppResult<()>;
}

/// Rewrites a CSV file with the latest record.
#[derive(Debug, Clone)]
pub struct CsvRecordWriter {
    path: PathBuf,
}

impl CsvRecordWriter {
    /// Writer targeting `path`; nothing is touched until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates the file and writes the header and `record`.
    pub fn write_latest(&self, record: &TestRecord) -> AppResult<()> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = record;
            return Err(BenchError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            ensure_parent(&self.path)?;
            let file = File::create(&self.path).map_err(|e| {
                BenchError::Storage(format!(
                    "Failed to create CSV file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

            let mut writer = csv::Writer::from_writer(file);
            writer
                .write_record(TestRecord::header())
                .map_err(|e| BenchError::Storage(e.to_string()))?;
            writer
                .write_record(record.row())
                .map_err(|e| BenchError::Storage(e.to_string()))?;
            writer
                .flush()
                .map_err(|e| BenchError::Storage(e.to_string()))?;

            info!(path = %self.path.display(), "Result exported as CSV");
            Ok(())
        }
    }
}

impl RecordSink for CsvRecordWriter {
    fn name(&self) -> &str {
        "csv"
    }

    fn write(&mut self, _frame: &Frame, record: &TestRecord) -> AppResult<()> {
        self.write_latest(record)
    }
}

/// Overwrites a text file with the latest raw message.
#[derive(Debug, Clone)]
pub struct CaptureLogWriter {
    path: PathBuf,
}

impl CaptureLogWriter {
    /// Writer targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CaptureLogWriter {
    fn name(&self) -> &str {
        "capture"
    }

    fn write(&mut self, frame: &Frame, _record: &TestRecord) -> AppResult<()> {
        ensure_parent(&self.path)?;
        let mut file = File::create(&self.path).map_err(|e| {
            BenchError::Storage(format!(
                "Failed to create capture file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        writeln!(file, "{}", frame.log_entry()).map_err(|e| BenchError::Storage(e.to_string()))?;
        debug!(path = %self.path.display(), "Captured message written");
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> AppResult<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            std::fs::create_dir_all(dir).map_err(|e| BenchError::Storage(e.to_string()))
        }
        _ => Ok(()),
    }
}
