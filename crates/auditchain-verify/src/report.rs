//! PASS/FAIL report.

use std::fmt;

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skipped => "SKIPPED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub outcome: Outcome,
    pub detail: String,
    /// Sequence number the check is about, if any.
    pub seq: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub checks: Vec<Check>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        name: impl Into<String>,
        outcome: Outcome,
        detail: impl Into<String>,
        seq: Option<u64>,
    ) {
        let check = Check {
            name: name.into(),
            outcome,
            detail: detail.into(),
            seq,
        };
        match outcome {
            Outcome::Fail => tracing::warn!(check = %check.name, detail = %check.detail, "check failed"),
            _ => tracing::debug!(check = %check.name, outcome = outcome.as_str(), "check done"),
        }
        self.checks.push(check);
    }

    pub fn pass(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, Outcome::Pass, detail, None);
    }

    pub fn fail(&mut self, name: impl Into<String>, detail: impl Into<String>, seq: Option<u64>) {
        self.record(name, Outcome::Fail, detail, seq);
    }

    pub fn skip(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.record(name, Outcome::Skipped, detail, None);
    }

    /// No check failed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.outcome != Outcome::Fail)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.outcome == Outcome::Fail)
    }

    pub fn first_failure(&self) -> Option<&Check> {
        self.failures().next()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "result": if self.passed() { "PASS" } else { "FAIL" },
            "checks": self.checks.iter().map(|c| json!({
                "name": c.name,
                "outcome": c.outcome.as_str(),
                "detail": c.detail,
                "seq": c.seq,
            })).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            write!(f, "[{:<7}] {}", check.outcome.as_str(), check.name)?;
            if !check.detail.is_empty() {
                write!(f, ": {}", check.detail)?;
            }
            writeln!(f)?;
        }
        if self.passed() {
            writeln!(f, "RESULT: PASS")
        } else {
            writeln!(f, "RESULT: FAIL")
        }
    }
}
