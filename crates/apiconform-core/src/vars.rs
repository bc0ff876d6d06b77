//! Per-file variable store ("auxiliary space") and placeholder substitution
//!
//! Values extracted from one step's request/response are written here and
//! substituted into later steps' parameters and request bodies.
//!
//! Write policy: last write wins. A later `storage_vars` extraction for an
//! existing name overwrites the earlier value in place (insertion order of
//! the first write is kept).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::jsonpath::{JsonPath, PathError};

/// An ordered list of `(name, value)` request parameters.
pub type Params = Vec<(String, String)>;

/// A `{variable}` reference that has no value in the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("variable '{variable}' referenced by '{param}' not found in storage vars")]
pub struct MissingVariable {
    /// Parameter name, or the JSON location for body placeholders
    pub param: String,
    pub variable: String,
}

/// Insertion-ordered mapping from variable names to stringified values.
///
/// Scoped to one test-file run: create a fresh store per file, never share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    entries: Vec<(String, String)>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the previous value, if any.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((name, value));
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace every parameter value of the exact form `{name}` with the
    /// stored value. Shallow: only the scalar values of the list are touched.
    ///
    /// # Errors
    ///
    /// Returns the first reference whose variable is not stored.
    pub fn substitute_params(&self, params: &[(String, String)]) -> Result<Params, MissingVariable> {
        params
            .iter()
            .map(|(key, value)| match placeholder_name(value) {
                Some(var) => self
                    .get(var)
                    .map(|resolved| (key.clone(), resolved.to_string()))
                    .ok_or_else(|| MissingVariable {
                        param: key.clone(),
                        variable: var.to_string(),
                    }),
                None => Ok((key.clone(), value.clone())),
            })
            .collect()
    }

    /// Deep substitution over a decoded request body: every string leaf of the
    /// exact form `{name}`, at any nesting depth, becomes the stored value.
    ///
    /// # Errors
    ///
    /// Returns the first placeholder whose variable is not stored.
    pub fn substitute_body(&self, body: &mut Value) -> Result<(), MissingVariable> {
        self.substitute_at(body, "$")
    }

    fn substitute_at(&self, node: &mut Value, location: &str) -> Result<(), MissingVariable> {
        match node {
            Value::String(s) => {
                if let Some(var) = placeholder_name(s) {
                    let resolved = self.get(var).ok_or_else(|| MissingVariable {
                        param: location.to_string(),
                        variable: var.to_string(),
                    })?;
                    *s = resolved.to_string();
                }
                Ok(())
            }
            Value::Array(items) => items
                .iter_mut()
                .enumerate()
                .try_for_each(|(i, item)| self.substitute_at(item, &format!("{location}[{i}]"))),
            Value::Object(map) => map
                .iter_mut()
                .try_for_each(|(k, v)| self.substitute_at(v, &format!("{location}.{k}"))),
            _ => Ok(()),
        }
    }

    /// Apply `storage_vars` (name → path) against a decoded document.
    ///
    /// Paths that resolve to nothing are skipped, so a later reference to that
    /// name fails deterministically instead of receiving a placeholder value.
    /// Returns the names written.
    ///
    /// # Errors
    ///
    /// Returns error if any path is malformed; nothing is written in that case.
    pub fn extract(
        &mut self,
        storage_vars: &BTreeMap<String, String>,
        document: &Value,
    ) -> Result<Vec<String>, PathError> {
        let parsed = storage_vars
            .iter()
            .map(|(name, path)| JsonPath::parse(path).map(|p| (name, p)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut written = Vec::new();
        for (name, path) in parsed {
            match path.resolve(document) {
                Some(value) => {
                    let text = stringify(value);
                    tracing::debug!("storage var {name} = {text}");
                    self.set(name.clone(), text);
                    written.push(name.clone());
                }
                None => {
                    tracing::debug!("storage var {name}: path {path} not present in document");
                }
            }
        }
        Ok(written)
    }
}

/// `"{task_id}"` → `Some("task_id")`. Strings with braces inside the name
/// (e.g. a JSON object literal) are not placeholders.
#[must_use]
pub fn placeholder_name(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains(['{', '}']) {
        return None;
    }
    Some(inner)
}

/// Render a JSON value as a parameter string: strings verbatim, everything
/// else as compact JSON text.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Template-style replacement: every string or integer leaf equal to `token`,
/// across arbitrarily nested lists and maps, becomes `replacement`.
///
/// Returns the number of leaves replaced.
pub fn replace_placeholder(data: &mut Value, token: &str, replacement: &Value) -> usize {
    match data {
        Value::String(s) if s == token => {
            *data = replacement.clone();
            1
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            if n.to_string() == token {
                *data = replacement.clone();
                1
            } else {
                0
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|item| replace_placeholder(item, token, replacement))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|v| replace_placeholder(v, token, replacement))
            .sum(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn set_and_get() {
        let mut store = VariableStore::new();
        assert!(store.is_empty());
        assert_eq!(store.set("id", "abc"), None);
        assert_eq!(store.get("id"), Some("abc"));
        assert_eq!(store.get("other"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn later_writes_overwrite_in_place() {
        let mut store = VariableStore::new();
        store.set("a", "1");
        store.set("b", "2");
        assert_eq!(store.set("a", "3"), Some("1".to_string()));
        let order: Vec<_> = store.iter().collect();
        assert_eq!(order, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn substitute_params_replaces_references() {
        let mut store = VariableStore::new();
        store.set("task_id", "task-93dd45a3");
        let resolved = store
            .substitute_params(&params(&[("id", "{task_id}"), ("view", "FULL")]))
            .unwrap();
        assert_eq!(resolved, params(&[("id", "task-93dd45a3"), ("view", "FULL")]));
    }

    #[test]
    fn substitute_params_missing_variable_fails() {
        let store = VariableStore::new();
        let err = store
            .substitute_params(&params(&[("id", "{task_id}")]))
            .unwrap_err();
        assert_eq!(err.param, "id");
        assert_eq!(err.variable, "task_id");
    }

    #[test]
    fn partial_braces_are_literals() {
        let store = VariableStore::new();
        let resolved = store
            .substitute_params(&params(&[("q", "{open"), ("r", "{}"), ("s", "{\"a\":{}}")]))
            .unwrap();
        assert_eq!(resolved[0].1, "{open");
        assert_eq!(resolved[1].1, "{}");
        assert_eq!(resolved[2].1, "{\"a\":{}}");
    }

    #[test]
    fn substitute_body_is_deep() {
        let mut store = VariableStore::new();
        store.set("image", "alpine");
        store.set("name", "hello");
        let mut body = json!({
            "name": "{name}",
            "executors": [{"image": "{image}", "command": ["echo", "{name}"]}],
            "resources": {"cpu_cores": 1}
        });
        store.substitute_body(&mut body).unwrap();
        assert_eq!(body["name"], "hello");
        assert_eq!(body["executors"][0]["image"], "alpine");
        assert_eq!(body["executors"][0]["command"][1], "hello");
        assert_eq!(body["resources"]["cpu_cores"], 1);
    }

    #[test]
    fn substitute_body_reports_location() {
        let store = VariableStore::new();
        let mut body = json!({"executors": [{"image": "{image}"}]});
        let err = store.substitute_body(&mut body).unwrap_err();
        assert_eq!(err.param, "$.executors[0].image");
        assert_eq!(err.variable, "image");
    }

    #[test]
    fn extract_stores_stringified_values() {
        let mut store = VariableStore::new();
        let vars = BTreeMap::from([
            ("id".to_string(), "$.id".to_string()),
            ("count".to_string(), "$.tasks.length".to_string()),
            ("size".to_string(), "$.size".to_string()),
        ]);
        let written = store
            .extract(&vars, &json!({"id": "abc123", "size": 3}))
            .unwrap();
        assert_eq!(written, vec!["id".to_string(), "size".to_string()]);
        assert_eq!(store.get("id"), Some("abc123"));
        assert_eq!(store.get("size"), Some("3"));
        assert!(!store.contains("count"));
    }

    #[test]
    fn extract_rejects_malformed_paths_without_writing() {
        let mut store = VariableStore::new();
        let vars = BTreeMap::from([
            ("a".to_string(), "$.id".to_string()),
            ("b".to_string(), "$..".to_string()),
        ]);
        assert!(store.extract(&vars, &json!({"id": "x"})).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn extracted_id_resolves_in_later_params() {
        let mut store = VariableStore::new();
        let vars = BTreeMap::from([("id".to_string(), "$.id".to_string())]);
        store.extract(&vars, &json!({"id": "abc123"})).unwrap();
        let resolved = store.substitute_params(&params(&[("id", "{id}")])).unwrap();
        assert_eq!(resolved[0].1, "abc123");
    }

    #[test]
    fn replace_placeholder_walks_lists_and_maps() {
        let mut data = json!([{"key1": "value1"}, ["item1", "item2"], "lorem_ipsum"]);
        let n = replace_placeholder(&mut data, "item2", &json!("item5"));
        assert_eq!(n, 1);
        assert_eq!(data[1][1], "item5");
    }

    #[test]
    fn replace_placeholder_matches_integers() {
        let mut data = json!({"page_size": 10, "view": "{view}"});
        replace_placeholder(&mut data, "10", &json!(25));
        replace_placeholder(&mut data, "{view}", &json!("FULL"));
        assert_eq!(data, json!({"page_size": 25, "view": "FULL"}));
    }

    #[test]
    fn stringify_scalars() {
        assert_eq!(stringify(&json!("x")), "x");
        assert_eq!(stringify(&json!(42)), "42");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!({"a": 1})), "{\"a\":1}");
    }

    proptest! {
        #[test]
        fn stored_value_round_trips_through_body(name in "[a-z_]{1,10}", value in "[^{}]{0,20}") {
            let mut store = VariableStore::new();
            store.set(name.clone(), value.clone());

            let mut body = json!({"field": format!("{{{name}}}")});
            store.substitute_body(&mut body).unwrap();

            // Echoed back by the server and re-extracted
            let mut echo_store = VariableStore::new();
            let vars = BTreeMap::from([(name.clone(), "$.field".to_string())]);
            echo_store.extract(&vars, &body).unwrap();
            prop_assert_eq!(echo_store.get(&name), Some(value.as_str()));
        }
    }
}
