//! Test-file model: a service, declared versions and tags, and an ordered list
//! of jobs (steps or template references)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::Filter;
use crate::vars::{Params, replace_placeholder, stringify};
use crate::verdict::StepError;

/// One test file. Identity is its path; immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestFile {
    /// Target service name, e.g. "TES"
    pub service: String,
    /// API versions this file applies to
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub jobs: Vec<Job>,
}

/// Either an inline step or a reference to a template file of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Job {
    Template(TemplateRef),
    Step(Box<Step>),
}

/// `{$ref: templates/create.yml, args: {name: "hello"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TemplateRef {
    /// Template path, relative to the referencing test file
    #[serde(rename = "$ref")]
    pub reference: PathBuf,
    /// Replacements: every leaf equal to `{key}` becomes the value
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

impl TemplateRef {
    /// Substitute the arguments into a decoded template document.
    #[must_use]
    pub fn apply(&self, mut template: Value) -> Value {
        for (key, value) in &self.args {
            let replaced = replace_placeholder(&mut template, &format!("{{{key}}}"), value);
            tracing::debug!(
                "template {}: replaced {replaced} occurrences of {{{key}}}",
                self.reference.display()
            );
        }
        template
    }
}

/// HTTP verb of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether requests with this verb carry a JSON body.
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll spacing and deadline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PollingSpec {
    pub interval: f64,
    pub timeout: f64,
}

impl PollingSpec {
    /// # Errors
    ///
    /// Returns a validation error if the interval is negative, not finite, or
    /// too large to represent.
    pub fn interval(&self) -> Result<Duration, StepError> {
        seconds("interval", self.interval)
    }

    /// # Errors
    ///
    /// Returns a validation error if the timeout is negative, not finite, or
    /// too large to represent.
    pub fn timeout(&self) -> Result<Duration, StepError> {
        seconds("timeout", self.timeout)
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, StepError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        StepError::validation(
            "Invalid polling spec",
            format!("polling {field} must be a non-negative number of seconds, got {value}"),
        )
        .with_detail(e.to_string())
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvVars {
    #[serde(default)]
    pub check_cancel: bool,
}

/// Query parameters as a mapping, or as a list of single-entry mappings
/// (the list form preserves order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParameters {
    List(Vec<BTreeMap<String, Value>>),
    Map(BTreeMap<String, Value>),
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl QueryParameters {
    /// Flatten to ordered, stringified pairs.
    #[must_use]
    pub fn pairs(&self) -> Params {
        let maps: Vec<&BTreeMap<String, Value>> = match self {
            Self::List(list) => list.iter().collect(),
            Self::Map(map) => vec![map],
        };
        maps.into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.clone(), stringify(v))))
            .collect()
    }
}

/// One API interaction ("job").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// Logical endpoint key, also the model-registry key
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub operation: Operation,
    /// URI template with `{param}` placeholders, e.g. "/tasks/{id}"
    pub endpoint: String,
    /// Values are literals or `{variable}` references
    #[serde(default)]
    pub path_parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub query_parameters: QueryParameters,
    /// JSON text (or an inline mapping); string leaves may be `{variable}` references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    /// Legacy layout: `response: {200: ""}` with exactly one status key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_cancel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<EnvVars>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Filter>,
    /// Variable name → path into the request body / response
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage_vars: BTreeMap<String, String>,
}

impl Step {
    /// "GET /tasks/{id}"
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.operation, self.endpoint)
    }

    /// The single expected status code.
    ///
    /// # Errors
    ///
    /// Returns a validation error if none, or more than one, is declared, or
    /// if a legacy status key is not numeric.
    pub fn expected_status(&self) -> Result<u16, StepError> {
        let legacy = match &self.response {
            None => None,
            Some(map) => Some(
                map.keys()
                    .map(|k| {
                        k.trim().parse::<u16>().map_err(|_| {
                            StepError::validation(
                                "Invalid expected status",
                                format!("{}: '{k}' is not an HTTP status code", self.label()),
                            )
                        })
                    })
                    .collect::<Result<Vec<u16>, _>>()?,
            ),
        };
        match (self.expected_status, legacy.as_deref()) {
            (Some(status), None) => Ok(status),
            (None, Some([status])) => Ok(*status),
            (Some(a), Some([b])) if a == *b => Ok(a),
            (None, None) => Err(StepError::validation(
                "Missing expected status",
                format!("{} declares no expected status", self.label()),
            )),
            _ => Err(StepError::validation(
                "Ambiguous expected status",
                format!("{} must declare exactly one expected status", self.label()),
            )),
        }
    }

    /// Cancel mode for the polling success predicate.
    #[must_use]
    pub fn check_cancel(&self) -> bool {
        self.check_cancel
            .or_else(|| self.env_vars.as_ref().map(|e| e.check_cancel))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn path_params(&self) -> Params {
        self.path_parameters
            .iter()
            .map(|(k, v)| (k.clone(), stringify(v)))
            .collect()
    }

    #[must_use]
    pub fn query_params(&self) -> Params {
        self.query_parameters.pairs()
    }

    /// Decode the request body, if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the body text is not valid JSON.
    pub fn parse_request_body(&self) -> Result<Option<Value>, StepError> {
        match &self.request_body {
            None => Ok(None),
            Some(Value::String(text)) => serde_json::from_str(text).map(Some).map_err(|e| {
                StepError::validation(
                    "JSON Decode Error",
                    format!("JSON Error in request body for {}", self.label()),
                )
                .with_detail(e.to_string())
            }),
            Some(inline) => Ok(Some(inline.clone())),
        }
    }
}
