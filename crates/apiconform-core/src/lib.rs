//! apiconform-core: Core types for API conformance testing
//!
//! This crate provides the test-file model, variable store, response filters,
//! model registry, selection rules, failure classification and report types.
//! It performs no I/O beyond reading config and schema files.

pub mod config;
pub mod dryrun;
pub mod filter;
pub mod jsonpath;
pub mod registry;
pub mod report;
pub mod selection;
pub mod testfile;
pub mod vars;
pub mod verdict;

pub use config::{Config, ConfigError, ModelSet, PollingStates, ServiceConfig};
pub use dryrun::{DryRunPlan, FilePlan, PlanContext};
pub use filter::{Filter, FilterError, FilterType};
pub use jsonpath::{JsonPath, PathError};
pub use registry::{Model, ModelRegistry, RegistryError};
pub use report::{
    CaseReport, FileReport, FileStatus, NullSink, ReportSink, Status, StepReport, SuiteReport,
};
pub use selection::{Selection, SkipReason};
pub use testfile::{Job, Operation, PollingSpec, Step, TemplateRef, TestFile};
pub use vars::{MissingVariable, Params, VariableStore};
pub use verdict::{ErrorKind, FailedFile, StepError, SuiteSummary, VerdictStatus};
