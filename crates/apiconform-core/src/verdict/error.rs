//! Typed step errors carrying a name/message/detail triple

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ErrorKind;

/// The typed result of a failed step.
///
/// Every layer returns this instead of raising; the suite runner decides how to
/// record it based on [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, thiserror::Error)]
#[error("{name}: {message}")]
pub struct StepError {
    pub kind: ErrorKind,
    /// Short title, e.g. "Incorrect HTTP Response Status"
    pub name: String,
    /// What went wrong, naming the operation and endpoint where known
    pub message: String,
    /// Underlying diagnostic (schema diff, transport error text, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepError {
    #[must_use]
    pub fn new(kind: ErrorKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn validation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, name, message)
    }

    #[must_use]
    pub fn assertion(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, name, message)
    }

    #[must_use]
    pub fn infrastructure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Infrastructure, name, message)
    }

    /// Attach diagnostic detail
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
