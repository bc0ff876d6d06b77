//! Structural filters evaluated against decoded JSON documents
//!
//! A filter resolves `path`, checks that the runtime shape matches `type`,
//! then applies the optional `value` (exact / regex / membership / subset)
//! and `size` checks. All supplied checks must pass.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jsonpath::{JsonPath, PathError};
use crate::verdict::ErrorKind;

/// Expected runtime shape at the filter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    String,
    Array,
    Object,
}

impl FilterType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Array, Value::Array(_))
                | (Self::Object, Value::Object(_))
        )
    }
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural assertion over a request or response body.
///
/// ```yaml
/// filter:
///   - path: $response.name
///     type: string
///     value: "^pre"
///     regex: true
///   - path: $response.tasks
///     type: array
///     size: 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Filter {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FilterType,
    /// Exact value (string), pattern (string + regex), element (array) or
    /// JSON-encoded subset (object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Treat `value` as a pattern searched within the string
    #[serde(default)]
    pub regex: bool,
    /// Expected length of the string, array or object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: String,
        expected: FilterType,
        found: &'static str,
    },
    #[error("{path}: {detail}")]
    ValueMismatch { path: String, detail: String },
    #[error("{path}: expected size {expected}, found {actual}")]
    SizeMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("{path}: invalid regex: {message}")]
    InvalidPattern { path: String, message: String },
    #[error("{path}: invalid filter value: {message}")]
    InvalidValue { path: String, message: String },
}

impl FilterError {
    /// Malformed filters are the test author's fault; mismatches are the server's.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Path(_) | Self::InvalidPattern { .. } | Self::InvalidValue { .. } => {
                ErrorKind::Validation
            }
            Self::TypeMismatch { .. } | Self::ValueMismatch { .. } | Self::SizeMismatch { .. } => {
                ErrorKind::Assertion
            }
        }
    }
}

impl Filter {
    /// Evaluate against a decoded document.
    ///
    /// # Errors
    ///
    /// Returns the first failing sub-check, in order: path, type, value, size.
    pub fn evaluate(&self, document: &Value) -> Result<(), FilterError> {
        let path = JsonPath::parse(&self.path)?;
        let resolved = path.resolve(document);

        let found = match resolved {
            Some(v) if self.kind.matches(v) => v,
            other => {
                return Err(FilterError::TypeMismatch {
                    path: self.path.clone(),
                    expected: self.kind,
                    found: other.map_or("nothing", json_type_name),
                });
            }
        };

        if let Some(expected) = &self.value {
            self.check_value(expected, found)?;
        }

        if let Some(expected) = self.size {
            let actual = match found {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            if actual != expected {
                return Err(FilterError::SizeMismatch {
                    path: self.path.clone(),
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }

    fn check_value(&self, expected: &Value, found: &Value) -> Result<(), FilterError> {
        let mismatch = |detail: String| FilterError::ValueMismatch {
            path: self.path.clone(),
            detail,
        };

        match (self.kind, found) {
            (FilterType::String, Value::String(actual)) if self.regex => {
                let pattern = expected.as_str().ok_or_else(|| FilterError::InvalidValue {
                    path: self.path.clone(),
                    message: format!("regex pattern must be a string, got {expected}"),
                })?;
                let re = Regex::new(pattern).map_err(|e| FilterError::InvalidPattern {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
                if re.is_match(actual) {
                    Ok(())
                } else {
                    Err(mismatch(format!("\"{actual}\" does not match /{pattern}/")))
                }
            }
            (FilterType::String, _) => {
                if expected == found {
                    Ok(())
                } else {
                    Err(mismatch(format!("expected {expected}, found {found}")))
                }
            }
            (FilterType::Array, Value::Array(items)) => {
                if items.contains(expected) {
                    Ok(())
                } else {
                    Err(mismatch(format!("{expected} is not an element of the array")))
                }
            }
            (FilterType::Object, Value::Object(actual)) => {
                let subset = decode_object(expected).map_err(|message| FilterError::InvalidValue {
                    path: self.path.clone(),
                    message,
                })?;
                match subset.iter().find(|(k, v)| actual.get(*k) != Some(*v)) {
                    None => Ok(()),
                    Some((k, v)) => Err(mismatch(format!(
                        "expected member {k} = {v}, found {}",
                        actual.get(k).map_or_else(|| "nothing".to_string(), Value::to_string)
                    ))),
                }
            }
            // Shape already checked by the caller
            _ => Ok(()),
        }
    }
}

/// Object filter values are written as JSON text in YAML; accept both forms.
fn decode_object(expected: &Value) -> Result<serde_json::Map<String, Value>, String> {
    match expected {
        Value::Object(map) => Ok(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("expected a JSON object, got {other}")),
            Err(e) => Err(e.to_string()),
        },
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

/// Runtime type name of a JSON value, for diagnostics.
#[must_use]
pub const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
