//! Error kinds for conformance runs
//!
//! The kind decides how a failed file is reported and which exit code it maps to.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Why a step (and therefore its file) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The test description itself is malformed (bad JSON body, missing variable,
    /// structural mismatch of the test file)
    Validation,
    /// The server's observable behavior does not match the expectation
    Assertion,
    /// Transport-level failure unrelated to conformance (DNS, refused, TLS, I/O)
    Infrastructure,
}

impl ErrorKind {
    /// Exit code contributed by a file failing with this kind.
    ///
    /// - Validation / Assertion: exit 1 (suite problem or non-conformant server)
    /// - Infrastructure: exit 3 (server or network unreachable)
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Validation | Self::Assertion => 1,
            Self::Infrastructure => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Assertion => "assertion",
            Self::Infrastructure => "infrastructure",
        }
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Validation => "Test description is invalid",
            Self::Assertion => "Server response does not match expectation",
            Self::Infrastructure => "Server or network unreachable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
