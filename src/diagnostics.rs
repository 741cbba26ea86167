//! Known diagnostic sentences and the verdicts they map to.
//!
//! The unit under test prints one fixed sentence per self-check. Matching is
//! exact (after trimming the line), so a firmware change in wording shows up
//! as an unmatched line rather than a silent misclassification.

use crate::record::{Column, FAIL_CODE, PASS_CODE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of a single self-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The check passed.
    Pass,
    /// The check failed.
    Fail,
}

impl Verdict {
    /// Code written to the CSV cell.
    pub fn code(self) -> &'static str {
        match self {
            Verdict::Pass => PASS_CODE,
            Verdict::Fail => FAIL_CODE,
        }
    }
}

/// One known sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRule {
    /// Exact line text printed by the unit.
    pub sentence: String,
    /// Column receiving the verdict code.
    pub column: Column,
    /// Verdict the sentence reports.
    pub verdict: Verdict,
}

impl DiagnosticRule {
    /// Convenience constructor.
    pub fn new(sentence: impl Into<String>, column: Column, verdict: Verdict) -> Self {
        Self {
            sentence: sentence.into(),
            column,
            verdict,
        }
    }
}

const BUILTIN_RULES: &[(&str, Column, Verdict)] = &[
    ("LED test passed", Column::Led, Verdict::Pass),
    ("LED test failed", Column::Led, Verdict::Fail),
    ("VCC voltage OK", Column::Vcc, Verdict::Pass),
    ("VCC voltage NOT OK", Column::Vcc, Verdict::Fail),
    ("PLUS voltage OK", Column::PlusVolt, Verdict::Pass),
    ("PLUS voltage NOT OK", Column::PlusVolt, Verdict::Fail),
    ("MINUS voltage OK", Column::MinusVolt, Verdict::Pass),
    ("MINUS voltage NOT OK", Column::MinusVolt, Verdict::Fail),
    ("BATTERY voltage OK", Column::BatteryVolt, Verdict::Pass),
    ("BATTERY voltage NOT OK", Column::BatteryVolt, Verdict::Fail),
    ("Raspberry Pi detected", Column::RaspberryPi, Verdict::Pass),
    ("Raspberry Pi not detected", Column::RaspberryPi, Verdict::Fail),
    ("Raspberry Pi running", Column::RaspberryPiRun, Verdict::Pass),
    ("Raspberry Pi not running", Column::RaspberryPiRun, Verdict::Fail),
];

/// Lookup table from sentence to `(column, verdict)`.
#[derive(Debug, Clone)]
pub struct DiagnosticTable {
    rules: HashMap<String, (Column, Verdict)>,
}

impl Default for DiagnosticTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DiagnosticTable {
    /// The sentences printed by current unit firmware.
    pub fn builtin() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(sentence, column, verdict)| (sentence.to_string(), (*column, *verdict)))
            .collect();
        Self { rules }
    }

    /// An empty table.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Built-in rules plus `extra`; an extra rule replaces a built-in one
    /// with the same sentence.
    pub fn with_rules<'a>(extra: impl IntoIterator<Item = &'a DiagnosticRule>) -> Self {
        let mut table = Self::builtin();
        for rule in extra {
            table.insert(rule.clone());
        }
        table
    }

    /// Adds or replaces a rule.
    pub fn insert(&mut self, rule: DiagnosticRule) {
        self.rules
            .insert(rule.sentence.trim().to_string(), (rule.column, rule.verdict));
    }

    /// Looks up an exact sentence.
    pub fn lookup(&self, line: &str) -> Option<(Column, Verdict)> {
        self.rules.get(line.trim()).copied()
    }

    /// Number of known sentences.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no sentences.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_every_check_column() {
        let table = DiagnosticTable::builtin();
        for column in [
            Column::Led,
            Column::Vcc,
            Column::PlusVolt,
            Column::MinusVolt,
            Column::BatteryVolt,
            Column::RaspberryPi,
            Column::RaspberryPiRun,
        ] {
            let hits: Vec<_> = BUILTIN_RULES.iter().filter(|(_, c, _)| *c == column).collect();
            assert_eq!(hits.len(), 2, "{} needs a pass and a fail sentence", column);
        }
        assert_eq!(table.len(), BUILTIN_RULES.len());
    }

    #[test]
    fn lookup_is_exact_after_trim() {
        let table = DiagnosticTable::builtin();
        assert_eq!(
            table.lookup("  VCC voltage OK \r"),
            Some((Column::Vcc, Verdict::Pass))
        );
        assert_eq!(table.lookup("vcc voltage ok"), None);
        assert_eq!(table.lookup("VCC voltage OK!"), None);
    }

    #[test]
    fn extra_rule_overrides_builtin() {
        let extra = [DiagnosticRule::new(
            "LED test passed",
            Column::Led,
            Verdict::Fail,
        )];
        let table = DiagnosticTable::with_rules(&extra);
        assert_eq!(table.lookup("LED test passed"), Some((Column::Led, Verdict::Fail)));
        assert_eq!(table.len(), BUILTIN_RULES.len());
    }

    #[test]
    fn verdict_codes() {
        assert_eq!(Verdict::Pass.code(), "1");
        assert_eq!(Verdict::Fail.code(), "0");
    }
}
