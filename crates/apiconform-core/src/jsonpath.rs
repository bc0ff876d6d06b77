//! Dotted-path lookup over decoded JSON documents
//!
//! Grammar (no expressions, nothing evaluated):
//!
//! ```text
//! path    := root? segment*
//! root    := '$' ident?            e.g. "$", "$response", "$request"
//! segment := '.' key | '[' digits ']'
//! ```
//!
//! A leading key without a root is also accepted (`"items[0].name"`).
//! Keys are matched against object members; a numeric key applied to an array
//! indexes into it.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path, ready to resolve against any number of documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: String,
}

impl PathError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl JsonPath {
    /// Parse a path expression.
    ///
    /// # Errors
    ///
    /// Returns error for empty paths, empty keys (`"$.a..b"`) and malformed
    /// index brackets.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::new(raw, "path is empty"));
        }

        let mut rest = trimmed;
        if let Some(after) = rest.strip_prefix('$') {
            let root_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            rest = &after[root_len..];
        } else {
            // Relative path: treat as if preceded by a dot
            let key_len = rest.find(['.', '[']).unwrap_or(rest.len());
            if key_len == 0 {
                return Err(PathError::new(raw, "path must start with '$' or a key"));
            }
        }

        let mut segments = Vec::new();
        let mut first = !trimmed.starts_with('$');
        while !rest.is_empty() || first {
            if first {
                first = false;
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                segments.push(Segment::Key(rest[..end].to_string()));
                rest = &rest[end..];
                continue;
            }
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                if end == 0 {
                    return Err(PathError::new(raw, "empty key segment"));
                }
                segments.push(Segment::Key(after[..end].to_string()));
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let close = after
                    .find(']')
                    .ok_or_else(|| PathError::new(raw, "unterminated '['"))?;
                let index = after[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| PathError::new(raw, format!("bad index '{}'", &after[..close])))?;
                segments.push(Segment::Index(index));
                rest = &after[close + 1..];
            } else {
                return Err(PathError::new(
                    raw,
                    format!("unexpected character in '{rest}'"),
                ));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Walk the document. Absent members or out-of-range indices yield `None`.
    #[must_use]
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?)?,
                (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
