//! The result row produced for each diagnostic message.
//!
//! A [`TestRecord`] holds one cell per [`Column`]. Columns are written in the
//! fixed order of [`Column::ALL`], which is also the CSV header order. The
//! `Status` cell is never set directly; it is derived from the configured
//! pass/fail columns by [`TestRecord::derive_status`].

use crate::error::AppResult;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Format used for the `Timestamp` cell and capture log entries.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Code stored in a pass/fail cell for a passing check.
pub const PASS_CODE: &str = "1";

/// Code stored in a pass/fail cell for a failing check.
pub const FAIL_CODE: &str = "0";

/// Number of screen slots a single message can fill.
pub const SCREEN_SLOTS: usize = 6;

/// A column of the result CSV, declared in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "Timestamp")]
    Timestamp,
    #[serde(rename = "Serial Number")]
    SerialNumber,
    #[serde(rename = "LED AVERAGE")]
    LedAverage,
    #[serde(rename = "VCC AVERAGE")]
    VccAverage,
    #[serde(rename = "PLUS AVERAGE")]
    PlusAverage,
    #[serde(rename = "MINUS AVERAGE")]
    MinusAverage,
    #[serde(rename = "BATTERY AVERAGE")]
    BatteryAverage,
    #[serde(rename = "LED")]
    Led,
    #[serde(rename = "VCC")]
    Vcc,
    #[serde(rename = "PLUS VOLT")]
    PlusVolt,
    #[serde(rename = "MINUS VOLT")]
    MinusVolt,
    #[serde(rename = "BATTERY VOLT")]
    BatteryVolt,
    #[serde(rename = "RASPBERRY PI")]
    RaspberryPi,
    #[serde(rename = "RASPBERRY PI RUN")]
    RaspberryPiRun,
    #[serde(rename = "SCREEN_1")]
    Screen1,
    #[serde(rename = "SCREEN_2")]
    Screen2,
    #[serde(rename = "SCREEN_3")]
    Screen3,
    #[serde(rename = "SCREEN_4")]
    Screen4,
    #[serde(rename = "SCREEN_5")]
    Screen5,
    #[serde(rename = "SCREEN_6")]
    Screen6,
    #[serde(rename = "Status")]
    Status,
}

impl Column {
    /// Every column, in CSV order.
    pub const ALL: [Column; 21] = [
        Column::Timestamp,
        Column::SerialNumber,
        Column::LedAverage,
        Column::VccAverage,
        Column::PlusAverage,
        Column::MinusAverage,
        Column::BatteryAverage,
        Column::Led,
        Column::Vcc,
        Column::PlusVolt,
        Column::MinusVolt,
        Column::BatteryVolt,
        Column::RaspberryPi,
        Column::RaspberryPiRun,
        Column::Screen1,
        Column::Screen2,
        Column::Screen3,
        Column::Screen4,
        Column::Screen5,
        Column::Screen6,
        Column::Status,
    ];

    /// Screen columns in assignment order.
    pub const SCREENS: [Column; SCREEN_SLOTS] = [
        Column::Screen1,
        Column::Screen2,
        Column::Screen3,
        Column::Screen4,
        Column::Screen5,
        Column::Screen6,
    ];

    /// Columns gating the `Status` cell unless configured otherwise.
    pub const DEFAULT_STATUS_FIELDS: [Column; 9] = [
        Column::Led,
        Column::Vcc,
        Column::PlusVolt,
        Column::MinusVolt,
        Column::BatteryVolt,
        Column::RaspberryPi,
        Column::RaspberryPiRun,
        Column::Screen1,
        Column::Screen2,
    ];

    /// The CSV header text for this column.
    pub fn header(self) -> &'static str {
        match self {
            Column::Timestamp => "Timestamp",
            Column::SerialNumber => "Serial Number",
            Column::LedAverage => "LED AVERAGE",
            Column::VccAverage => "VCC AVERAGE",
            Column::PlusAverage => "PLUS AVERAGE",
            Column::MinusAverage => "MINUS AVERAGE",
            Column::BatteryAverage => "BATTERY AVERAGE",
            Column::Led => "LED",
            Column::Vcc => "VCC",
            Column::PlusVolt => "PLUS VOLT",
            Column::MinusVolt => "MINUS VOLT",
            Column::BatteryVolt => "BATTERY VOLT",
            Column::RaspberryPi => "RASPBERRY PI",
            Column::RaspberryPiRun => "RASPBERRY PI RUN",
            Column::Screen1 => "SCREEN_1",
            Column::Screen2 => "SCREEN_2",
            Column::Screen3 => "SCREEN_3",
            Column::Screen4 => "SCREEN_4",
            Column::Screen5 => "SCREEN_5",
            Column::Screen6 => "SCREEN_6",
            Column::Status => "Status",
        }
    }

    /// Whether the column holds a `1`/`0` verdict code.
    pub fn is_pass_fail(self) -> bool {
        matches!(
            self,
            Column::Led
                | Column::Vcc
                | Column::PlusVolt
                | Column::MinusVolt
                | Column::BatteryVolt
                | Column::RaspberryPi
                | Column::RaspberryPiRun
                | Column::Screen1
                | Column::Screen2
                | Column::Screen3
                | Column::Screen4
                | Column::Screen5
                | Column::Screen6
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.header().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown column '{}'", s))
    }
}

/// Overall verdict for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Every status field passed.
    Good,
    /// At least one status field failed.
    Bad,
}

impl Status {
    /// Text written to the `Status` cell.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Good => "GOOD",
            Status::Bad => "BAD",
        }
    }
}

/// One result row.
///
/// Serializes as a flat map keyed by header name; unset cells are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TestRecord {
    cells: BTreeMap<Column, String>,
}

impl TestRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record stamped with the receive time of its message.
    pub fn stamped(received_at: DateTime<Local>) -> Self {
        let mut record = Self::new();
        record.set(
            Column::Timestamp,
            received_at.format(TIMESTAMP_FORMAT).to_string(),
        );
        record
    }

    /// Sets a cell, replacing any previous value.
    pub fn set(&mut self, column: Column, value: impl Into<String>) {
        self.cells.insert(column, value.into());
    }

    /// Returns the cell value, if set.
    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells.get(&column).map(String::as_str)
    }

    /// Number of cells that hold a value.
    pub fn filled(&self) -> usize {
        self.cells.len()
    }

    /// Sets the serial number cell unless `serial` is empty.
    pub fn set_serial_number(&mut self, serial: Option<&str>) {
        match serial.map(str::trim) {
            Some(s) if !s.is_empty() => self.set(Column::SerialNumber, s),
            _ => {}
        }
    }

    /// Computes the unit verdict over `fields`.
    ///
    /// A single `"0"` makes the unit `BAD`. The unit is `GOOD` only when every
    /// field is `"1"`. Anything else (missing cells, unexpected codes) leaves
    /// the verdict undecided.
    pub fn status_over(&self, fields: &[Column]) -> Option<Status> {
        if fields.is_empty() {
            return None;
        }
        if fields.iter().any(|c| self.get(*c) == Some(FAIL_CODE)) {
            return Some(Status::Bad);
        }
        if fields.iter().all(|c| self.get(*c) == Some(PASS_CODE)) {
            return Some(Status::Good);
        }
        None
    }

    /// Recomputes the `Status` cell from `fields`.
    pub fn derive_status(&mut self, fields: &[Column]) -> Option<Status> {
        let status = self.status_over(fields);
        match status {
            Some(s) => self.set(Column::Status, s.as_str()),
            None => {
                self.cells.remove(&Column::Status);
            }
        }
        status
    }

    /// All cells in CSV order, empty strings for unset cells.
    pub fn row(&self) -> Vec<&str> {
        Column::ALL
            .iter()
            .map(|c| self.get(*c).unwrap_or(""))
            .collect()
    }

    /// The CSV header row.
    pub fn header() -> Vec<&'static str> {
        Column::ALL.iter().map(|c| c.header()).collect()
    }

    /// The record as a single-line JSON object keyed by header name.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_pass() -> TestRecord {
        let mut record = TestRecord::new();
        for column in Column::DEFAULT_STATUS_FIELDS {
            record.set(column, PASS_CODE);
        }
        record
    }

    #[test]
    fn header_matches_column_order() {
        let header = TestRecord::header();
        assert_eq!(header.len(), 21);
        assert_eq!(header[0], "Timestamp");
        assert_eq!(header[1], "Serial Number");
        assert_eq!(header[2], "LED AVERAGE");
        assert_eq!(header[13], "RASPBERRY PI RUN");
        assert_eq!(header[14], "SCREEN_1");
        assert_eq!(header[20], "Status");
    }

    #[test]
    fn status_good_when_all_fields_pass() {
        let mut record = all_pass();
        assert_eq!(
            record.derive_status(&Column::DEFAULT_STATUS_FIELDS),
            Some(Status::Good)
        );
        assert_eq!(record.get(Column::Status), Some("GOOD"));
    }

    #[test]
    fn status_bad_when_any_field_fails() {
        let mut record = all_pass();
        record.set(Column::BatteryVolt, FAIL_CODE);
        assert_eq!(
            record.derive_status(&Column::DEFAULT_STATUS_FIELDS),
            Some(Status::Bad)
        );
        assert_eq!(record.get(Column::Status), Some("BAD"));
    }

    #[test]
    fn fail_wins_over_missing_fields() {
        let mut record = TestRecord::new();
        record.set(Column::Led, FAIL_CODE);
        assert_eq!(
            record.status_over(&Column::DEFAULT_STATUS_FIELDS),
            Some(Status::Bad)
        );
    }

    #[test]
    fn status_unset_when_a_field_is_missing() {
        let mut record = all_pass();
        record.cells.remove(&Column::Screen2);
        assert_eq!(record.derive_status(&Column::DEFAULT_STATUS_FIELDS), None);
        assert_eq!(record.get(Column::Status), None);
    }

    #[test]
    fn stale_status_is_cleared() {
        let mut record = all_pass();
        record.derive_status(&Column::DEFAULT_STATUS_FIELDS);
        record.set(Column::Led, "maybe");
        assert_eq!(record.derive_status(&Column::DEFAULT_STATUS_FIELDS), None);
        assert_eq!(record.get(Column::Status), None);
    }

    #[test]
    fn row_fills_gaps_with_empty_cells() {
        let mut record = TestRecord::new();
        record.set(Column::SerialNumber, "AM60-0001");
        let row = record.row();
        assert_eq!(row.len(), Column::ALL.len());
        assert_eq!(row[0], "");
        assert_eq!(row[1], "AM60-0001");
    }

    #[test]
    fn json_uses_header_names() {
        let mut record = TestRecord::new();
        record.set(Column::SerialNumber, "AM60-0001");
        record.set(Column::Screen1, PASS_CODE);
        let json = record.to_json().unwrap();
        assert_eq!(json, r#"{"Serial Number":"AM60-0001","SCREEN_1":"1"}"#);
    }

    #[test]
    fn blank_serial_is_ignored() {
        let mut record = TestRecord::new();
        record.set_serial_number(Some("   "));
        assert_eq!(record.get(Column::SerialNumber), None);
        record.set_serial_number(Some(" SN123 "));
        assert_eq!(record.get(Column::SerialNumber), Some("SN123"));
    }

    #[test]
    fn column_parses_from_header_text() {
        assert_eq!("PLUS VOLT".parse::<Column>(), Ok(Column::PlusVolt));
        assert_eq!("screen_3".parse::<Column>(), Ok(Column::Screen3));
        assert!("SCREEN_7".parse::<Column>().is_err());
    }
}
