//! Report types handed to the report sink
//!
//! Steps record one case per check (status code, schema validation, each
//! filter); files aggregate their steps; the suite aggregates files. All types
//! are serializable and carry a JSON Schema for downstream consumers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::testfile::{Step, TestFile};
use crate::verdict::{ErrorKind, StepError, SuiteSummary};

/// Result of a single check or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

/// One check within a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaseReport {
    /// e.g. "status_code", "response_schema_validation", "filter-1"
    pub name: String,
    pub description: String,
    pub status: Status,
    pub message: String,
    /// Diagnostic output (schema diff, mismatch detail)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl CaseReport {
    #[must_use]
    pub fn pass(
        name: impl Into<String>,
        description: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status: Status::Pass,
            message: message.into(),
            log: None,
        }
    }

    #[must_use]
    pub fn fail(
        name: impl Into<String>,
        description: impl Into<String>,
        message: impl Into<String>,
        log: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status: Status::Fail,
            message: message.into(),
            log,
        }
    }

    #[must_use]
    pub fn skip(
        name: impl Into<String>,
        description: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            status: Status::Skip,
            message: message.into(),
            log: None,
        }
    }
}

/// Verdict for one step, with its checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StepReport {
    pub name: String,
    pub description: String,
    /// "GET /tasks/{id}"
    pub operation: String,
    /// Endpoint template as written in the test file
    #[serde(default)]
    pub endpoint: String,
    pub status: Status,
    pub cases: Vec<CaseReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepReport {
    #[must_use]
    pub fn new(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            description: step.description.clone(),
            operation: step.label(),
            endpoint: step.endpoint.clone(),
            status: Status::Pass,
            cases: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn add_case(&mut self, case: CaseReport) {
        self.cases.push(case);
    }

    /// Mark failed; the first error wins.
    pub fn fail(&mut self, error: StepError) {
        self.status = Status::Fail;
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }
}

/// Outcome of one test file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileReport {
    pub path: String,
    #[serde(default)]
    pub description: String,
    pub status: FileStatus,
    /// Distinguishes "server is non-conformant" from "server unreachable"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepReport>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl FileReport {
    #[must_use]
    pub fn new(path: impl Into<String>, file: Option<&TestFile>) -> Self {
        Self {
            path: path.into(),
            description: file.map(|f| f.description.clone()).unwrap_or_default(),
            status: FileStatus::Passed,
            failure_kind: None,
            error: None,
            skip_reason: None,
            steps: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn fail(&mut self, error: StepError) {
        self.status = FileStatus::Failed;
        self.failure_kind = Some(error.kind);
        self.error = Some(error);
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = FileStatus::Skipped;
        self.skip_reason = Some(reason.into());
    }
}

/// Receives per-step and per-file results as the suite runs.
pub trait ReportSink {
    fn step_finished(&mut self, _file: &str, _step: &StepReport) {}

    fn file_finished(&mut self, file: &FileReport);
}

/// Full results of one suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SuiteReport {
    pub server: String,
    pub version: String,
    /// ISO 8601 UTC, set by the caller
    #[serde(default)]
    pub started: String,
    #[serde(default)]
    pub finished: String,
    pub files: Vec<FileReport>,
    pub summary: SuiteSummary,
}

impl SuiteReport {
    #[must_use]
    pub fn new(server: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            version: version.into(),
            ..Self::default()
        }
    }
}

impl ReportSink for SuiteReport {
    fn file_finished(&mut self, file: &FileReport) {
        match (file.status, file.failure_kind) {
            (FileStatus::Passed, _) => self.summary.record_passed(&file.path),
            (FileStatus::Skipped, _) => self.summary.record_skipped(&file.path),
            (FileStatus::Failed, kind) => self
                .summary
                .record_failed(&file.path, kind.unwrap_or(ErrorKind::Validation)),
        }
        self.files.push(file.clone());
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn file_finished(&mut self, _file: &FileReport) {}
}

/// Generate JSON Schema for the suite report.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(SuiteReport);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}

/// Generate JSON Schema for the test-file format.
#[must_use]
pub fn generate_test_file_schema() -> String {
    let schema = schemars::schema_for!(TestFile);
    serde_json::to_string_pretty(&schema).expect("schema serialization should not fail")
}
