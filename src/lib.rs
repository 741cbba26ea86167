//! # AM60 Test Bench Library
//!
//! Core of the `am60-bench` tool used on the AM60 production line. The bench
//! listens to a unit under test over a serial link, cuts its diagnostic
//! report out of the byte stream, maps the report onto a fixed set of result
//! columns, and keeps the latest result in a one-row CSV file for the line
//! database loader.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML file, environment) via `figment`.
//! - **`diagnostics`**: The table of known pass/fail sentences.
//! - **`error`**: The `BenchError` enum and `AppResult` alias.
//! - **`extract`**: Line-by-line field extraction from a framed message.
//! - **`framing`**: `START`/`STOP` marker search over the incoming text.
//! - **`logging`**: `tracing-subscriber` initialization.
//! - **`monitor`**: The reader tasks and the frame-to-record pipeline.
//! - **`ports`**: Serial port enumeration and opening.
//! - **`record`**: Result columns, the `TestRecord` row and the unit verdict.
//! - **`scanner`**: Serial barcode scanner reader for unit serial numbers.
//! - **`storage`**: CSV and capture-log writers.
//! - **`validation`**: Small validators used by the configuration checks.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod framing;
pub mod logging;
pub mod monitor;
pub mod ports;
pub mod record;
pub mod scanner;
pub mod storage;
pub mod validation;
