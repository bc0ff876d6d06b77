//! Test-file loading: YAML or JSON, with `$ref` template expansion

use std::path::{Path, PathBuf};

use serde_json::Value;

use apiconform_core::testfile::{Job, Step, TestFile};
use apiconform_core::StepError;

/// Directory name holding templates; never collected as test files.
pub const TEMPLATE_DIR: &str = "templates";

/// A parsed test file with its jobs expanded into steps.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub file: TestFile,
    pub steps: Vec<Step>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot read {0}: {1}")]
    Io(String, String),
    #[error("Invalid test file {0}: {1}")]
    Parse(String, String),
    #[error("Invalid template {0}: {1}")]
    Template(String, String),
}

impl From<LoadError> for StepError {
    fn from(e: LoadError) -> Self {
        let name = match e {
            LoadError::Io(..) => "Test file read error",
            LoadError::Parse(..) => "Test file validation error",
            LoadError::Template(..) => "Template validation error",
        };
        Self::validation(name, e.to_string())
    }
}

/// Read a YAML (or `.json`) document into a JSON value.
fn read_document(path: &Path) -> Result<Value, LoadError> {
    let display = path.display().to_string();
    let content =
        std::fs::read_to_string(path).map_err(|e| LoadError::Io(display.clone(), e.to_string()))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).map_err(|e| LoadError::Parse(display, e.to_string()))
    } else {
        serde_yml::from_str(&content).map_err(|e| LoadError::Parse(display, e.to_string()))
    }
}

/// Parse one test file without expanding its template references.
///
/// # Errors
///
/// Returns error if the file cannot be read or does not match the test-file
/// structure.
pub fn read_test_file(path: &Path) -> Result<TestFile, LoadError> {
    let document = read_document(path)?;
    serde_json::from_value(document)
        .map_err(|e| LoadError::Parse(path.display().to_string(), e.to_string()))
}

/// Expand the template references of a parsed test file. Template paths
/// resolve against the file's own directory.
///
/// # Errors
///
/// Returns error if a referenced template cannot be read or is invalid.
pub fn expand_file(path: &Path, file: TestFile) -> Result<LoadedFile, LoadError> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let steps = expand_jobs(&file, base_dir)?;
    tracing::debug!(path = %path.display(), steps = steps.len(), "loaded test file");
    Ok(LoadedFile {
        path: path.to_path_buf(),
        file,
        steps,
    })
}

/// Flatten jobs into steps. Template paths resolve against `base_dir`.
fn expand_jobs(file: &TestFile, base_dir: &Path) -> Result<Vec<Step>, LoadError> {
    let mut steps = Vec::new();
    for job in &file.jobs {
        match job {
            Job::Step(step) => steps.push((**step).clone()),
            Job::Template(template) => {
                let path = base_dir.join(&template.reference);
                let shown = path.display().to_string();
                let document = read_document(&path).map_err(|e| match e {
                    LoadError::Parse(p, m) => LoadError::Template(p, m),
                    other => other,
                })?;
                let expanded: Vec<Step> = serde_json::from_value(template.apply(document))
                    .map_err(|e| LoadError::Template(shown.clone(), e.to_string()))?;
                tracing::debug!(template = %shown, steps = expanded.len(), "expanded template");
                steps.extend(expanded);
            }
        }
    }
    Ok(steps)
}

/// Collect test files from files and directories, recursively and sorted.
/// Directories named [`TEMPLATE_DIR`] are skipped.
///
/// # Errors
///
/// Returns error if a path does not exist or a directory cannot be read.
pub fn collect_test_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, LoadError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut files)?;
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(LoadError::Io(
                path.display().to_string(),
                "no such file or directory".into(),
            ));
        }
    }
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let io = |e: std::io::Error| LoadError::Io(dir.display().to_string(), e.to_string());
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(io)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(io)?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == TEMPLATE_DIR) {
                continue;
            }
            walk(&path, out)?;
        } else if is_test_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_test_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "yml" | "yaml" | "json"))
}
