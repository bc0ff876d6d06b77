//! Version and tag selection of test files

use crate::config::Config;
use crate::testfile::TestFile;

/// Why a file was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file does not declare the version under test
    Version { wanted: String, declared: Vec<String> },
    /// Tag selection excluded the file
    Tags { tags: Vec<String> },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Version { wanted, declared } => {
                write!(f, "version {wanted} not in {declared:?}")
            }
            Self::Tags { tags } => write!(f, "tags {tags:?} did not match the selection"),
        }
    }
}

/// The user's version/tag selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub version: String,
    include_tags: Vec<String>,
    exclude_tags: Vec<String>,
}

impl Selection {
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        include_tags: &[String],
        exclude_tags: &[String],
    ) -> Self {
        Self {
            version: version.into(),
            include_tags: include_tags.iter().map(|t| t.to_lowercase()).collect(),
            exclude_tags: exclude_tags.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.version, &config.include_tags, &config.exclude_tags)
    }

    /// No exclude tag present, and at least one include tag present.
    #[must_use]
    pub fn matches_tags(&self, tags: &[String]) -> bool {
        let tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        !self.exclude_tags.iter().any(|t| tags.contains(t))
            && self.include_tags.iter().any(|t| tags.contains(t))
    }

    #[must_use]
    pub fn matches_version(&self, versions: &[String]) -> bool {
        versions.iter().any(|v| *v == self.version)
    }

    /// # Errors
    ///
    /// Returns the reason the file should be skipped.
    pub fn check(&self, file: &TestFile) -> Result<(), SkipReason> {
        if !self.matches_version(&file.versions) {
            return Err(SkipReason::Version {
                wanted: self.version.clone(),
                declared: file.versions.clone(),
            });
        }
        if !self.matches_tags(&file.tags) {
            return Err(SkipReason::Tags {
                tags: file.tags.clone(),
            });
        }
        Ok(())
    }
}
