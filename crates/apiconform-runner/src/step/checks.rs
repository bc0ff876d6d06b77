//! Per-step checks
//!
//! No I/O. Each check records one case on the step report and returns the
//! classified error that aborts the step when it fails.

use serde_json::Value;

use apiconform_core::filter::Filter;
use apiconform_core::registry::ModelRegistry;
use apiconform_core::report::{CaseReport, StepReport};
use apiconform_core::testfile::Step;
use apiconform_core::StepError;

/// What a schema check validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Subject {
    RequestBody,
    Response,
}

impl Subject {
    const fn title(self) -> &'static str {
        match self {
            Self::RequestBody => "Request Body",
            Self::Response => "Response",
        }
    }

    const fn case_name(self) -> &'static str {
        match self {
            Self::RequestBody => "request_body_schema_validation",
            Self::Response => "response_schema_validation",
        }
    }
}

/// Decode the request body, recording `request_body_json_validation`.
pub(super) fn request_json(
    step: &Step,
    label: &str,
    report: &mut StepReport,
) -> Result<Option<Value>, StepError> {
    if step.request_body.is_none() {
        return Ok(None);
    }
    const NAME: &str = "request_body_json_validation";
    const DESCRIPTION: &str = "Check if request body is in proper JSON format";
    match step.parse_request_body() {
        Ok(body) => {
            report.add_case(CaseReport::pass(
                NAME,
                DESCRIPTION,
                format!("Proper JSON format in request body for {label}"),
            ));
            Ok(body)
        }
        Err(e) => {
            report.add_case(CaseReport::fail(NAME, DESCRIPTION, &e.message, e.detail.clone()));
            Err(e)
        }
    }
}

/// Record that the response model check does not apply to an error status.
pub(super) fn skip_response_schema(label: &str, expected: u16, report: &mut StepReport) {
    let subject = Subject::Response;
    report.add_case(CaseReport::skip(
        subject.case_name(),
        format!("Check if {} matches the model schema", subject.title().to_lowercase()),
        format!("No response model for {label} expecting status {expected}"),
    ));
}

/// Compare the response status with the single expected status.
pub(super) fn status(
    label: &str,
    expected: u16,
    actual: u16,
    report: &mut StepReport,
) -> Result<(), StepError> {
    const NAME: &str = "status_code";
    let description = format!("Check if response status code is {expected}");
    if actual == expected {
        tracing::info!("{label} response status code matched");
        report.add_case(CaseReport::pass(
            NAME,
            description,
            format!("{label} Successful Response status code"),
        ));
        return Ok(());
    }

    let message = format!("Response status code for {label} did not match");
    let detail = format!("expected {expected}, got {actual}");
    report.add_case(CaseReport::fail(NAME, description, &message, Some(detail.clone())));
    Err(StepError::assertion("Incorrect HTTP Response Status", message).with_detail(detail))
}

/// Validate a document against the model registered under `key`.
pub(super) fn schema(
    registry: &ModelRegistry,
    version: &str,
    key: &str,
    document: &Value,
    subject: Subject,
    label: &str,
    report: &mut StepReport,
) -> Result<(), StepError> {
    let description = format!("Check if {} matches the model schema", subject.title().to_lowercase());

    let model = match registry.lookup(version, key) {
        Ok(model) => model,
        Err(e) => {
            let message = format!("No model for {} of {label}", subject.title());
            report.add_case(CaseReport::fail(
                subject.case_name(),
                description,
                &message,
                Some(e.to_string()),
            ));
            return Err(StepError::validation("Model Not Found", message).with_detail(e.to_string()));
        }
    };

    match model.validate(document) {
        Ok(()) => {
            tracing::info!(
                "{} Schema validation successful for {label} ({})",
                subject.title(),
                model.name()
            );
            report.add_case(CaseReport::pass(
                subject.case_name(),
                description,
                format!("{} Schema validation successful for {label}", subject.title()),
            ));
            Ok(())
        }
        Err(errors) => {
            let message = format!("{} Schema validation failed for {label}", subject.title());
            let detail = format!("{}: {}", model.name(), errors.join("; "));
            report.add_case(CaseReport::fail(
                subject.case_name(),
                description,
                &message,
                Some(detail.clone()),
            ));
            Err(StepError::assertion("Schema Validation Error", message).with_detail(detail))
        }
    }
}

/// Evaluate filters in order; the first failure stops the rest.
pub(super) fn filters(
    filters: &[Filter],
    document: &Value,
    label: &str,
    report: &mut StepReport,
) -> Result<(), StepError> {
    for (index, filter) in filters.iter().enumerate() {
        let index = index + 1;
        let name = format!("filter-{index}");
        let description = format!("Validate the response against filter-{index}");
        match filter.evaluate(document) {
            Ok(()) => {
                tracing::info!("Filter-{index} passed");
                report.add_case(CaseReport::pass(
                    name,
                    description,
                    format!("Filter-{index} passed for {label}"),
                ));
            }
            Err(e) => {
                tracing::info!("Filter-{index} failed: {e}");
                let message = format!("Filter-{index} failed for {label}");
                report.add_case(CaseReport::fail(
                    name,
                    description,
                    &message,
                    Some(e.to_string()),
                ));
                return Err(StepError::new(e.kind(), "Failed filtering", message)
                    .with_detail(e.to_string()));
            }
        }
    }
    Ok(())
}
