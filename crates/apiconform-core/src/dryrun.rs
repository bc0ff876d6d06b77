//! Dry run plan types and static checks
//!
//! Describes what a run *would* do without sending any requests: which files
//! are selected, which steps they contain, and which problems can be found
//! before touching the server (unresolvable variables, missing models,
//! malformed bodies). Used for pre-flight validation and CI previews.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, ServiceConfig};
use crate::jsonpath::JsonPath;
use crate::registry::{ModelRegistry, request_body_key, response_key};
use crate::selection::Selection;
use crate::testfile::{Step, TestFile};
use crate::vars::placeholder_name;

// ── Plan types ──

/// Complete dry run plan: files, steps, and validation results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DryRunPlan {
    pub files: Vec<FilePlan>,
    /// Steps across all selected files
    pub total_steps: usize,
    /// Config-level validation results
    pub validations: Vec<Validation>,
}

/// What would happen to one test file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FilePlan {
    pub path: String,
    pub service: String,
    pub description: String,
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub steps: Vec<StepPlan>,
    /// Static problems found in this file's steps
    pub validations: Vec<Validation>,
}

/// What one step would do.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepPlan {
    pub name: String,
    /// "POST /tasks"
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    /// "every 10s for up to 3600s (cancel states)"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<String>,
    /// Variables the step reads
    pub uses: Vec<String>,
    /// Variables the step writes
    pub stores: Vec<String>,
    pub filters: usize,
    /// Registry key of the request body model, if the step has a body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_model: Option<String>,
    /// Registry key of the response model
    pub response_model: String,
}

/// A validation check result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Validation {
    pub check: String,
    pub status: ValidationStatus,
    pub message: String,
}

impl Validation {
    fn new(check: &str, status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Status of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ── Config validation ──

/// Header values that look like an unfilled template.
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-token",
    "YOUR_TOKEN",
    "your-api-key",
    "CHANGEME",
    "changeme",
    "REPLACE_ME",
];

/// Validate config and produce validation results.
#[must_use]
pub fn validate_config(config: &Config) -> Vec<Validation> {
    let mut checks = Vec::new();

    if config.server.starts_with("http://") || config.server.starts_with("https://") {
        checks.push(Validation::new(
            "server",
            ValidationStatus::Ok,
            format!("server: {}", config.server),
        ));
    } else {
        checks.push(Validation::new(
            "server",
            ValidationStatus::Warning,
            format!(
                "server: {} (missing http:// or https:// prefix)",
                config.server
            ),
        ));
    }

    for (name, service) in &config.services {
        for (key, value) in &service.headers {
            let angle = value.contains('<') && value.contains('>');
            if angle || PLACEHOLDER_PATTERNS.iter().any(|p| value.contains(p)) {
                checks.push(Validation::new(
                    "headers",
                    ValidationStatus::Warning,
                    format!("{name}: header {key} looks like a placeholder"),
                ));
            }
        }

        match service.models.get(&config.version) {
            None => checks.push(Validation::new(
                "models",
                ValidationStatus::Warning,
                format!(
                    "{name}: no models configured for version {}; schema checks will fail",
                    config.version
                ),
            )),
            Some(set) => {
                let path = config.base_dir.join(&set.schema);
                if path.exists() {
                    checks.push(Validation::new(
                        "models",
                        ValidationStatus::Ok,
                        format!(
                            "{name}: {} models from {}",
                            set.endpoints.len(),
                            path.display()
                        ),
                    ));
                } else {
                    checks.push(Validation::new(
                        "models",
                        ValidationStatus::Error,
                        format!("{name}: schema {} (not found)", path.display()),
                    ));
                }
            }
        }
    }

    checks
}

// ── File planning ──

/// What the planner may consult while walking a file.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub selection: &'a Selection,
    pub service: Option<&'a ServiceConfig>,
    pub registry: Option<&'a ModelRegistry>,
}

impl FilePlan {
    /// Plan one file. `steps` are the file's jobs with templates expanded.
    #[must_use]
    pub fn build(path: &str, file: &TestFile, steps: &[Step], ctx: PlanContext<'_>) -> Self {
        let mut plan = Self {
            path: path.to_string(),
            service: file.service.clone(),
            description: file.description.clone(),
            selected: true,
            skip_reason: None,
            steps: Vec::new(),
            validations: Vec::new(),
        };

        if let Err(reason) = ctx.selection.check(file) {
            plan.selected = false;
            plan.skip_reason = Some(reason.to_string());
            return plan;
        }

        if ctx.service.is_none() {
            plan.validations.push(Validation::new(
                "service",
                ValidationStatus::Error,
                format!("service '{}' is not configured", file.service),
            ));
        }

        let mut stored: BTreeSet<String> = BTreeSet::new();
        for step in steps {
            let step_plan = plan.plan_step(step, &stored, ctx);
            stored.extend(step_plan.stores.iter().cloned());
            plan.steps.push(step_plan);
        }
        plan
    }

    fn plan_step(&mut self, step: &Step, stored: &BTreeSet<String>, ctx: PlanContext<'_>) -> StepPlan {
        let label = step.label();
        let expected_status = match step.expected_status() {
            Ok(status) => Some(status),
            Err(e) => {
                self.error("status", format!("{label}: {}", e.message));
                None
            }
        };

        let mut uses = BTreeSet::new();
        for (_, value) in step.path_params().iter().chain(step.query_params().iter()) {
            if let Some(var) = placeholder_name(value) {
                uses.insert(var.to_string());
            }
        }

        let body = match step.parse_request_body() {
            Ok(body) => body,
            Err(e) => {
                self.error("request_body", format!("{label}: {}", e.message));
                None
            }
        };
        if let Some(body) = &body {
            collect_placeholders(body, &mut uses);
        }

        for var in uses.iter().filter(|v| !stored.contains(*v)) {
            self.error(
                "variables",
                format!("{label}: '{{{var}}}' is used before any step stores it"),
            );
        }

        for (name, path) in &step.storage_vars {
            if let Err(e) = JsonPath::parse(path) {
                self.error("storage_vars", format!("{label}: {name}: {e}"));
            }
        }
        for (i, filter) in step.filter.iter().enumerate() {
            if let Err(e) = JsonPath::parse(&filter.path) {
                self.error("filter", format!("{label}: filter-{}: {e}", i + 1));
            }
        }

        let request_model = body.as_ref().map(|_| request_body_key(&step.name));
        let response_model = ctx.service.map_or_else(
            || step.name.clone(),
            |service| {
                response_key(
                    &step.name,
                    &step.query_params(),
                    &service.view_endpoints,
                    &service.default_view,
                )
            },
        );

        if let Some(registry) = ctx.registry {
            let version = &ctx.selection.version;
            for key in request_model.iter().chain(std::iter::once(&response_model)) {
                if !registry.contains(version, key) {
                    self.validations.push(Validation::new(
                        "models",
                        ValidationStatus::Warning,
                        format!("{label}: no model registered for '{key}' in {version}"),
                    ));
                }
            }
        }

        if let Some(spec) = step.polling {
            for error in [spec.interval().err(), spec.timeout().err()].into_iter().flatten() {
                self.error("polling", format!("{label}: {}", error.message));
            }
        }
        let polling = step.polling.map(|p| {
            let mode = if step.check_cancel() { "cancel" } else { "complete" };
            format!(
                "every {}s for up to {}s ({mode} states)",
                p.interval, p.timeout
            )
        });

        StepPlan {
            name: step.name.clone(),
            operation: label,
            expected_status,
            polling,
            uses: uses.into_iter().collect(),
            stores: step.storage_vars.keys().cloned().collect(),
            filters: step.filter.len(),
            request_model,
            response_model,
        }
    }

    fn error(&mut self, check: &str, message: String) {
        self.validations
            .push(Validation::new(check, ValidationStatus::Error, message));
    }
}

fn collect_placeholders(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            if let Some(var) = placeholder_name(s) {
                out.insert(var.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, out)),
        _ => {}
    }
}

// ── Display helpers ──

impl DryRunPlan {
    #[must_use]
    pub fn new(validations: Vec<Validation>) -> Self {
        Self {
            validations,
            ..Self::default()
        }
    }

    pub fn push(&mut self, file: FilePlan) {
        if file.selected {
            self.total_steps += file.steps.len();
        }
        self.files.push(file);
    }

    /// Format as human-readable terminal output.
    #[must_use]
    pub fn to_terminal(&self) -> String {
        let mut lines = Vec::new();

        let selected = self.files.iter().filter(|f| f.selected).count();
        lines.push(format!(
            "Dry run: {selected} of {} files selected, {} steps planned\n",
            self.files.len(),
            self.total_steps,
        ));

        for file in &self.files {
            if let Some(reason) = &file.skip_reason {
                lines.push(format!("{} [skipped: {reason}]", file.path));
                continue;
            }
            lines.push(format!("{} ({}):", file.path, file.service));
            if !file.description.is_empty() {
                lines.push(format!("  {}", file.description));
            }
            for step in &file.steps {
                let status = step
                    .expected_status
                    .map_or_else(|| "?".to_string(), |s| s.to_string());
                lines.push(format!("  {} -> {status}", step.operation));
                if let Some(polling) = &step.polling {
                    lines.push(format!("    Polling: {polling}"));
                }
                if !step.uses.is_empty() {
                    lines.push(format!("    Uses: {}", step.uses.join(", ")));
                }
                if !step.stores.is_empty() {
                    lines.push(format!("    Stores: {}", step.stores.join(", ")));
                }
                if step.filters > 0 {
                    lines.push(format!("    Filters: {}", step.filters));
                }
            }
            for v in &file.validations {
                lines.push(format!("  [{}] {}", v.status, v.message));
            }
            lines.push(String::new());
        }

        lines.push("Config validation:".into());
        for v in &self.validations {
            lines.push(format!("  [{}] {}", v.status, v.message));
        }

        lines.join("\n")
    }

    fn all_validations(&self) -> impl Iterator<Item = &Validation> {
        self.validations
            .iter()
            .chain(self.files.iter().flat_map(|f| f.validations.iter()))
    }

    /// Returns true if any validation has Error status.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.all_validations()
            .any(|v| v.status == ValidationStatus::Error)
    }

    /// Returns true if any validation has Warning status.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.all_validations()
            .any(|v| v.status == ValidationStatus::Warning)
    }
}
