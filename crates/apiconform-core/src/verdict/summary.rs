//! Suite summary - aggregates per-file outcomes into a final verdict

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ErrorKind;

/// A file that failed, with the kind of its first error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailedFile {
    pub file: String,
    pub kind: ErrorKind,
}

/// Passed/failed/skipped file identifiers plus counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SuiteSummary {
    /// Number of test files visited (including skipped)
    pub total: u64,
    pub passed: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub skipped: Vec<String>,
}

impl SuiteSummary {
    pub fn record_passed(&mut self, file: impl Into<String>) {
        self.total += 1;
        self.passed.push(file.into());
    }

    pub fn record_failed(&mut self, file: impl Into<String>, kind: ErrorKind) {
        self.total += 1;
        self.failed.push(FailedFile {
            file: file.into(),
            kind,
        });
    }

    pub fn record_skipped(&mut self, file: impl Into<String>) {
        self.total += 1;
        self.skipped.push(file.into());
    }

    /// Files that actually executed (passed or failed).
    #[must_use]
    pub fn executed(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    /// Failures caused by transport problems rather than non-conformance.
    #[must_use]
    pub fn infrastructure_failures(&self) -> usize {
        self.failed
            .iter()
            .filter(|f| f.kind == ErrorKind::Infrastructure)
            .count()
    }

    /// Determine final exit code.
    ///
    /// Conformance failures (exit 1) take precedence over infrastructure
    /// failures (exit 3) so that a partially reachable server still reports
    /// its non-conformance.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let conformance = self
            .failed
            .iter()
            .filter(|f| f.kind != ErrorKind::Infrastructure)
            .map(|f| f.kind.exit_code())
            .max();

        match conformance {
            Some(code) => code,
            None if !self.failed.is_empty() => ErrorKind::Infrastructure.exit_code(),
            None => 0,
        }
    }

    /// PASS requires at least one executed file and no failures.
    #[must_use]
    pub fn status(&self) -> VerdictStatus {
        if self.failed.is_empty() && self.executed() > 0 {
            VerdictStatus::Pass
        } else {
            VerdictStatus::Fail
        }
    }

    #[must_use]
    pub fn reason(&self) -> String {
        if self.executed() == 0 {
            return "No test files matched the version/tag selection".to_string();
        }
        if self.failed.is_empty() {
            return "All selected test files passed".to_string();
        }

        let infra = self.infrastructure_failures();
        let mut parts = vec![format!(
            "{} of {} files failed",
            self.failed.len(),
            self.executed()
        )];
        if infra > 0 {
            parts.push(format!("{infra} unreachable (infrastructure)"));
        }
        parts.join("; ")
    }
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}
