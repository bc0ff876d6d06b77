//! Model registry: `(API version, endpoint key) → compiled JSON Schema`
//!
//! Populated once at startup from the service configuration and queried by
//! plain lookup. Endpoint keys follow the suite's naming:
//!
//! - `create_task_request_body` : request body of step `create_task`
//! - `get_task_FULL` : response of a view-parameterized step with `view=FULL`
//! - `service_info` : response of any other step

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::config::ServiceConfig;

/// Places a named model may live inside a schema document.
const MODEL_POINTERS: &[&str] = &["/$defs", "/definitions", "/components/schemas"];

/// Maximum number of schema errors kept per failed validation
const MAX_ERRORS: usize = 5;

/// A named model with its compiled validator.
pub struct Model {
    name: String,
    validator: jsonschema::Validator,
}

impl Model {
    /// Compile a standalone schema.
    ///
    /// # Errors
    ///
    /// Returns error if the schema itself is invalid.
    pub fn compile(name: impl Into<String>, schema: &Value) -> Result<Self, RegistryError> {
        let name = name.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| RegistryError::Schema {
            model: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { name, validator })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate an instance. On failure returns up to five error messages.
    ///
    /// # Errors
    ///
    /// Returns the schema diff when the instance does not conform.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .take(MAX_ERRORS)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model").field("name", &self.name).finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Cannot read schema {0}: {1}")]
    Io(String, String),
    #[error("Schema document {0} is not valid JSON: {1}")]
    Parse(String, String),
    #[error("No models registered for version {0}")]
    UnknownVersion(String),
    #[error("No model registered for '{key}' (version {version})")]
    UnknownKey { version: String, key: String },
    #[error("Model {model} not found in schema document")]
    MissingModel { model: String },
    #[error("Invalid schema for model {model}: {message}")]
    Schema { model: String, message: String },
}

/// Lookup table from `(version, endpoint key)` to [`Model`].
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<(String, String), Model>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under `(version, key)`, replacing any previous entry.
    pub fn insert(&mut self, version: impl Into<String>, key: impl Into<String>, model: Model) {
        self.models.insert((version.into(), key.into()), model);
    }

    /// Register every `endpoint key → model name` pair of one version, pulling
    /// each model out of a shared schema document (`$defs`, `definitions` or
    /// `components.schemas`). References inside the document stay resolvable.
    ///
    /// # Errors
    ///
    /// Returns error if a model is missing from the document or fails to compile.
    pub fn register_document(
        &mut self,
        version: &str,
        endpoints: &BTreeMap<String, String>,
        document: &Value,
    ) -> Result<(), RegistryError> {
        for (key, model_name) in endpoints {
            let model = compile_from_document(model_name, document)?;
            self.insert(version, key.clone(), model);
        }
        Ok(())
    }

    /// Build the registry for one service from its configured model sets.
    /// Relative schema paths resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if a schema file cannot be read, parsed or compiled.
    pub fn from_service(service: &ServiceConfig, base_dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (version, set) in &service.models {
            let path = base_dir.join(&set.schema);
            let content = std::fs::read_to_string(&path)
                .map_err(|e| RegistryError::Io(path.display().to_string(), e.to_string()))?;
            let document: Value = serde_json::from_str(&content)
                .map_err(|e| RegistryError::Parse(path.display().to_string(), e.to_string()))?;
            registry.register_document(version, &set.endpoints, &document)?;
            tracing::debug!(
                "registered {} models for version {version} from {}",
                set.endpoints.len(),
                path.display()
            );
        }
        Ok(registry)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownVersion`] when nothing is registered for
    /// the version at all, [`RegistryError::UnknownKey`] otherwise.
    pub fn lookup(&self, version: &str, key: &str) -> Result<&Model, RegistryError> {
        if let Some(model) = self.models.get(&(version.to_string(), key.to_string())) {
            return Ok(model);
        }
        if self.models.keys().any(|(v, _)| v == version) {
            Err(RegistryError::UnknownKey {
                version: version.to_string(),
                key: key.to_string(),
            })
        } else {
            Err(RegistryError::UnknownVersion(version.to_string()))
        }
    }

    #[must_use]
    pub fn contains(&self, version: &str, key: &str) -> bool {
        self.models
            .contains_key(&(version.to_string(), key.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn compile_from_document(model_name: &str, document: &Value) -> Result<Model, RegistryError> {
    let pointer = MODEL_POINTERS
        .iter()
        .map(|base| format!("{base}/{model_name}"))
        .find(|p| document.pointer(p).is_some())
        .ok_or_else(|| RegistryError::MissingModel {
            model: model_name.to_string(),
        })?;

    let mut root = match document {
        Value::Object(map) => map.clone(),
        _ => {
            return Err(RegistryError::MissingModel {
                model: model_name.to_string(),
            });
        }
    };
    root.insert("$ref".to_string(), Value::String(format!("#{pointer}")));
    Model::compile(model_name, &Value::Object(root))
}

/// Registry key for a step's request body.
#[must_use]
pub fn request_body_key(step_name: &str) -> String {
    format!("{step_name}_request_body")
}

/// Registry key for a step's response.
///
/// View-parameterized endpoints append the `view` query parameter value
/// (or `default_view` when the step does not send one).
#[must_use]
pub fn response_key(
    step_name: &str,
    query: &[(String, String)],
    view_endpoints: &[String],
    default_view: &str,
) -> String {
    if view_endpoints.iter().any(|e| e == step_name) {
        let view = query
            .iter()
            .find(|(k, _)| k == "view")
            .map_or(default_view, |(_, v)| v.as_str());
        format!("{step_name}_{view}")
    } else {
        step_name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tes_document() -> Value {
        json!({
            "$defs": {
                "TesCreateTaskResponse": {
                    "type": "object",
                    "required": ["id"],
                    "properties": {"id": {"type": "string"}}
                },
                "TesState": {
                    "type": "string",
                    "enum": ["QUEUED", "RUNNING", "COMPLETE", "CANCELED"]
                },
                "TesTaskMinimal": {
                    "type": "object",
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "string"},
                        "state": {"$ref": "#/$defs/TesState"}
                    }
                }
            }
        })
    }

    fn registry() -> ModelRegistry {
        let mut r = ModelRegistry::new();
        let endpoints = BTreeMap::from([
            ("create_task".to_string(), "TesCreateTaskResponse".to_string()),
            ("get_task_MINIMAL".to_string(), "TesTaskMinimal".to_string()),
        ]);
        r.register_document("1.0.0", &endpoints, &tes_document())
            .unwrap();
        r
    }

    #[test]
    fn lookup_and_validate() {
        let r = registry();
        let model = r.lookup("1.0.0", "create_task").unwrap();
        assert_eq!(model.name(), "TesCreateTaskResponse");
        assert!(model.validate(&json!({"id": "task-1"})).is_ok());
        assert!(model.validate(&json!({})).is_err());
    }

    #[test]
    fn internal_refs_resolve() {
        let r = registry();
        let model = r.lookup("1.0.0", "get_task_MINIMAL").unwrap();
        assert!(model.validate(&json!({"id": "t", "state": "QUEUED"})).is_ok());
        let errors = model
            .validate(&json!({"id": "t", "state": "EXPLODED"}))
            .unwrap_err();
        assert!(errors[0].contains("EXPLODED"));
    }

    #[test]
    fn unknown_version_and_key() {
        let r = registry();
        assert!(matches!(
            r.lookup("2.0.0", "create_task"),
            Err(RegistryError::UnknownVersion(_))
        ));
        assert!(matches!(
            r.lookup("1.0.0", "cancel_task"),
            Err(RegistryError::UnknownKey { .. })
        ));
    }

    #[test]
    fn missing_model_in_document() {
        let mut r = ModelRegistry::new();
        let endpoints = BTreeMap::from([("x".to_string(), "Nope".to_string())]);
        let err = r
            .register_document("1.0.0", &endpoints, &tes_document())
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingModel { .. }));
    }

    #[test]
    fn openapi_components_are_found() {
        let doc = json!({
            "openapi": "3.1.0",
            "components": {"schemas": {"TesServiceInfo": {
                "type": "object",
                "required": ["name"]
            }}}
        });
        let mut r = ModelRegistry::new();
        let endpoints = BTreeMap::from([("service_info".to_string(), "TesServiceInfo".to_string())]);
        r.register_document("1.1.0", &endpoints, &doc).unwrap();
        let model = r.lookup("1.1.0", "service_info").unwrap();
        assert!(model.validate(&json!({"name": "tes"})).is_ok());
        assert!(model.validate(&json!({"id": "tes"})).is_err());
        assert!(r.contains("1.1.0", "service_info"));
        assert!(!r.contains("1.0.0", "service_info"));
    }

    #[test]
    fn request_body_key_suffix() {
        assert_eq!(request_body_key("create_task"), "create_task_request_body");
    }

    #[test]
    fn response_key_uses_view_for_view_endpoints() {
        let views = vec!["list_tasks".to_string(), "get_task".to_string()];
        let query = vec![("view".to_string(), "FULL".to_string())];
        assert_eq!(response_key("get_task", &query, &views, "MINIMAL"), "get_task_FULL");
        assert_eq!(response_key("list_tasks", &[], &views, "MINIMAL"), "list_tasks_MINIMAL");
        assert_eq!(response_key("service_info", &query, &views, "MINIMAL"), "service_info");
    }

    #[test]
    fn from_service_reads_schema_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tes.json"),
            serde_json::to_string(&tes_document()).unwrap(),
        )
        .unwrap();

        let mut service = ServiceConfig::default();
        service.models.insert(
            "1.0.0".to_string(),
            crate::config::ModelSet {
                schema: "tes.json".into(),
                endpoints: BTreeMap::from([(
                    "create_task".to_string(),
                    "TesCreateTaskResponse".to_string(),
                )]),
            },
        );

        let r = ModelRegistry::from_service(&service, dir.path()).unwrap();
        assert_eq!(r.len(), 1);
        assert!(r.contains("1.0.0", "create_task"));
    }
}
