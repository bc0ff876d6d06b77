//! Harness configuration: target server, selection, and per-service settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the server under test, e.g. "http://localhost:8000/ga4gh/tes/"
    #[serde(default = "default_server")]
    pub server: String,

    /// API version under test (semver, e.g. "1.1.0")
    #[serde(default = "default_version")]
    pub version: String,

    /// Run files carrying at least one of these tags (case-insensitive)
    #[serde(default = "default_include_tags")]
    pub include_tags: Vec<String>,

    /// Never run files carrying any of these tags
    #[serde(default)]
    pub exclude_tags: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Settings per target service, keyed by the `service` field of test files
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Directory relative schema paths resolve against (the config file's directory)
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Settings for one target service (e.g. "TES").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Headers sent with every request (content negotiation, auth)
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    /// Steps whose response model depends on the `view` query parameter
    #[serde(default = "default_view_endpoints")]
    pub view_endpoints: Vec<String>,

    /// View assumed when a view-parameterized step sends none
    #[serde(default = "default_view")]
    pub default_view: String,

    /// Terminal states for polled resources
    #[serde(default)]
    pub polling: PollingStates,

    /// Model sets per API version
    #[serde(default)]
    pub models: BTreeMap<String, ModelSet>,
}

/// Endpoint-key → model-name table for one API version, plus the schema
/// document the models live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSet {
    /// JSON Schema document holding the models (`$defs`, `definitions` or
    /// `components.schemas`)
    pub schema: PathBuf,

    /// e.g. `create_task = "TesCreateTaskResponse"`
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

/// Which values of the status-like field end a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingStates {
    /// Field of the polled body holding the resource state
    #[serde(default = "default_state_field")]
    pub state_field: String,

    /// Terminal states in normal mode
    #[serde(default = "default_complete_states")]
    pub complete_states: Vec<String>,

    /// Terminal states in cancel mode
    #[serde(default = "default_cancel_states")]
    pub cancel_states: Vec<String>,
}

impl PollingStates {
    /// Terminal set for the given mode.
    #[must_use]
    pub fn terminal(&self, check_cancel: bool) -> &[String] {
        if check_cancel {
            &self.cancel_states
        } else {
            &self.complete_states
        }
    }
}

impl Default for PollingStates {
    fn default() -> Self {
        Self {
            state_field: default_state_field(),
            complete_states: default_complete_states(),
            cancel_states: default_cancel_states(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            headers: default_headers(),
            view_endpoints: default_view_endpoints(),
            default_view: default_view(),
            polling: PollingStates::default(),
            models: BTreeMap::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server(),
            version: default_version(),
            include_tags: default_include_tags(),
            exclude_tags: Vec::new(),
            request_timeout: default_request_timeout(),
            services: default_services(),
            base_dir: PathBuf::from("."),
        }
    }
}

fn default_server() -> String {
    "http://localhost:8000/ga4gh/tes/".to_string()
}

fn default_version() -> String {
    "1.1.0".to_string()
}

fn default_include_tags() -> Vec<String> {
    vec!["all".to_string()]
}

const fn default_request_timeout() -> f64 {
    30.0
}

fn default_services() -> BTreeMap<String, ServiceConfig> {
    BTreeMap::from([("TES".to_string(), ServiceConfig::default())])
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "application/json".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

fn default_view_endpoints() -> Vec<String> {
    vec!["list_tasks".to_string(), "get_task".to_string()]
}

fn default_view() -> String {
    "MINIMAL".to_string()
}

fn default_state_field() -> String {
    "state".to_string()
}

fn default_complete_states() -> Vec<String> {
    ["COMPLETE", "EXECUTOR_ERROR", "SYSTEM_ERROR", "PREEMPTED"]
        .map(String::from)
        .to_vec()
}

fn default_cancel_states() -> Vec<String> {
    ["CANCELED", "CANCELING"].map(String::from).to_vec()
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let mut config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.check()?;
        Ok(config)
    }

    /// Load from default location (.apiconform.toml)
    ///
    /// Falls back to the defaults when no config file exists.
    ///
    /// # Errors
    ///
    /// Returns error if a config file is found but cannot be read, parsed, or
    /// fails validation.
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".apiconform.toml", ".apiconform.json", "apiconform.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    /// Settings for a target service.
    ///
    /// # Errors
    ///
    /// Returns error if the service is not configured.
    pub fn service(&self, name: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_request_timeout()))
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.request_timeout <= 0.0 || Duration::try_from_secs_f64(self.request_timeout).is_err() {
            return Err(ConfigError::Invalid(format!(
                "request_timeout must be a positive number of seconds, got {}",
                self.request_timeout
            )));
        }
        if self.version.split('.').next().is_none_or(|major| major.parse::<u64>().is_err()) {
            return Err(ConfigError::Invalid(format!(
                "version must start with a numeric major version, got '{}'",
                self.version
            )));
        }
        Ok(())
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# apiconform configuration

# Server under test (the major version segment, e.g. "v1", is appended)
server = "http://localhost:8000/ga4gh/tes/"

# API version under test; only test files declaring it are run
version = "1.1.0"

# Tag selection (case-insensitive)
include_tags = ["all"]
exclude_tags = []

# Per-request timeout in seconds
request_timeout = 30.0

[services.TES]
view_endpoints = ["list_tasks", "get_task"]
default_view = "MINIMAL"

[services.TES.headers]
Accept = "application/json"
Content-Type = "application/json"
# Authorization = "Bearer your-token-here"

[services.TES.polling]
state_field = "state"
complete_states = ["COMPLETE", "EXECUTOR_ERROR", "SYSTEM_ERROR", "PREEMPTED"]
cancel_states = ["CANCELED", "CANCELING"]

# Models per API version. `schema` is a JSON Schema document whose `$defs`
# (or `definitions` / `components.schemas`) hold the named models.
[services.TES.models."1.1.0"]
schema = "models/tes-1.1.0.json"

[services.TES.models."1.1.0".endpoints]
service_info = "TesServiceInfo"
list_tasks_MINIMAL = "TesListTasksResponseMinimal"
list_tasks_BASIC = "TesListTasksResponse"
list_tasks_FULL = "TesListTasksResponse"
get_task_MINIMAL = "TesTaskMinimal"
get_task_BASIC = "TesTask"
get_task_FULL = "TesTask"
create_task = "TesCreateTaskResponse"
create_task_request_body = "TesTask"
cancel_task = "TesCancelTaskResponse"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Service '{0}' is not configured")]
    UnknownService(String),
}
