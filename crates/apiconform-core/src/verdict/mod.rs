//! Verdict module - error classification, step errors and suite summary

mod error;
mod kind;
mod summary;

pub use error::StepError;
pub use kind::ErrorKind;
pub use summary::{FailedFile, SuiteSummary, VerdictStatus};
