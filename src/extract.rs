//! Field extraction from a framed diagnostic message.
//!
//! Each line of a frame is tested, in order, against:
//!
//! 1. the fixed average prefixes (`led_avg =` and friends), which carry a
//!    numeric reading,
//! 2. the exact sentences of the [`DiagnosticTable`],
//! 3. a case-insensitive `not ok` / `working ok` test for screen checks,
//!    assigned to `SCREEN_1`..`SCREEN_6` in encounter order.
//!
//! The first test that matches wins; later tests are not tried.

use crate::diagnostics::{DiagnosticTable, Verdict};
use crate::framing::Frame;
use crate::record::{Column, TestRecord};
use tracing::{debug, warn};

const AVERAGE_PREFIXES: &[(&str, Column)] = &[
    ("led_avg =", Column::LedAverage),
    ("vcc_avg =", Column::VccAverage),
    ("plus_avg =", Column::PlusAverage),
    ("minus_avg =", Column::MinusAverage),
    ("battery_avg =", Column::BatteryAverage),
];

const SCREEN_FAIL: &str = "not ok";
const SCREEN_PASS: &str = "working ok";

/// Counters describing one extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Average readings stored.
    pub averages: usize,
    /// Table sentences matched.
    pub checks: usize,
    /// Screen lines assigned to a slot.
    pub screens: usize,
    /// Screen lines beyond the last slot.
    pub overflow_screens: usize,
    /// Lines that matched nothing.
    pub unmatched: usize,
}

/// Maps frame lines onto record cells.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    table: DiagnosticTable,
}

impl FieldExtractor {
    /// Creates an extractor over the given sentence table.
    pub fn new(table: DiagnosticTable) -> Self {
        Self { table }
    }

    /// Builds a fresh record for `frame`, stamped with its receive time.
    pub fn record_for(&self, frame: &Frame) -> (TestRecord, ExtractionSummary) {
        let mut record = TestRecord::stamped(frame.received_at);
        let summary = self.apply(&frame.text, &mut record);
        (record, summary)
    }

    /// Extracts every recognised field of `text` into `record`.
    pub fn apply(&self, text: &str, record: &mut TestRecord) -> ExtractionSummary {
        let mut summary = ExtractionSummary::default();
        let mut screens = Column::SCREENS.iter();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some((column, value)) = parse_average(line) {
                match value.parse::<f64>() {
                    Ok(_) => {
                        record.set(column, value);
                        summary.averages += 1;
                    }
                    Err(_) => warn!(%column, value, "Ignoring non-numeric average"),
                }
                continue;
            }

            if let Some((column, verdict)) = self.table.lookup(line) {
                record.set(column, verdict.code());
                summary.checks += 1;
                continue;
            }

            if let Some(verdict) = screen_verdict(line) {
                match screens.next() {
                    Some(column) => {
                        record.set(*column, verdict.code());
                        summary.screens += 1;
                    }
                    None => {
                        warn!(line, "More screen results than screen columns, ignoring");
                        summary.overflow_screens += 1;
                    }
                }
                continue;
            }

            debug!(line, "Unrecognised diagnostic line");
            summary.unmatched += 1;
        }

        summary
    }
}

fn parse_average(line: &str) -> Option<(Column, &str)> {
    AVERAGE_PREFIXES.iter().find_map(|(prefix, column)| {
        line.strip_prefix(prefix)
            .map(|rest| (*column, rest.trim()))
    })
}

fn screen_verdict(line: &str) -> Option<Verdict> {
    let lower = line.to_lowercase();
    if lower.contains(SCREEN_FAIL) {
        Some(Verdict::Fail)
    } else if lower.contains(SCREEN_PASS) {
        Some(Verdict::Pass)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticRule;

    fn extract(text: &str) -> (TestRecord, ExtractionSummary) {
        let extractor = FieldExtractor::default();
        let mut record = TestRecord::new();
        let summary = extractor.apply(text, &mut record);
        (record, summary)
    }

    #[test]
    fn averages_are_read_by_prefix() {
        let (record, summary) = extract("led_avg = 2.914\nbattery_avg =   3.70 \n");
        assert_eq!(record.get(Column::LedAverage), Some("2.914"));
        assert_eq!(record.get(Column::BatteryAverage), Some("3.70"));
        assert_eq!(summary.averages, 2);
    }

    #[test]
    fn non_numeric_average_is_skipped() {
        let (record, summary) = extract("vcc_avg = n/a");
        assert_eq!(record.get(Column::VccAverage), None);
        assert_eq!(summary.averages, 0);
    }

    #[test]
    fn table_sentences_set_codes() {
        let (record, summary) = extract("START\nVCC voltage OK\nRaspberry Pi not running\nSTOP");
        assert_eq!(record.get(Column::Vcc), Some("1"));
        assert_eq!(record.get(Column::RaspberryPiRun), Some("0"));
        assert_eq!(summary.checks, 2);
        // marker lines
        assert_eq!(summary.unmatched, 2);
    }

    #[test]
    fn table_wins_over_screen_test() {
        // "NOT OK" would also satisfy the screen test
        let (record, summary) = extract("MINUS voltage NOT OK");
        assert_eq!(record.get(Column::MinusVolt), Some("0"));
        assert_eq!(record.get(Column::Screen1), None);
        assert_eq!(summary.screens, 0);
    }

    #[test]
    fn average_prefix_wins_over_table_sentence() {
        let mut table = DiagnosticTable::builtin();
        table.insert(DiagnosticRule::new("led_avg = 2.5", Column::Led, Verdict::Fail));
        let extractor = FieldExtractor::new(table);

        let mut record = TestRecord::new();
        let summary = extractor.apply("led_avg = 2.5", &mut record);

        assert_eq!(record.get(Column::LedAverage), Some("2.5"));
        assert_eq!(record.get(Column::Led), None);
        assert_eq!(summary.averages, 1);
        assert_eq!(summary.checks, 0);
    }

    #[test]
    fn screens_fill_in_encounter_order() {
        let text = "Screen 1 working OK\nscreen 2 NOT OK\nScreen 3 Working Ok";
        let (record, summary) = extract(text);
        assert_eq!(record.get(Column::Screen1), Some("1"));
        assert_eq!(record.get(Column::Screen2), Some("0"));
        assert_eq!(record.get(Column::Screen3), Some("1"));
        assert_eq!(record.get(Column::Screen4), None);
        assert_eq!(summary.screens, 3);
    }

    #[test]
    fn extra_screens_are_ignored() {
        let text = (1..=8)
            .map(|i| format!("screen {} working ok", i))
            .collect::<Vec<_>>()
            .join("\n");
        let (record, summary) = extract(&text);
        assert_eq!(record.get(Column::Screen6), Some("1"));
        assert_eq!(summary.screens, 6);
        assert_eq!(summary.overflow_screens, 2);
    }

    #[test]
    fn record_for_stamps_frame_time() {
        let frame = Frame::new("START\nLED test passed\nSTOP");
        let (record, _) = FieldExtractor::default().record_for(&frame);
        assert_eq!(
            record.get(Column::Timestamp),
            Some(frame.received_at.format("%Y-%m-%d %H:%M:%S").to_string().as_str())
        );
        assert_eq!(record.get(Column::Led), Some("1"));
    }
}
