//! Step runner: interprets one step against the server
//!
//! Per step, in order: resolve parameters from the variable store, decode,
//! substitute and validate the request body, dispatch (direct or polling),
//! check the status, decode and validate the response, evaluate filters, and
//! write `storage_vars` back into the store. The first failure aborts the step
//! and is returned as a classified [`StepError`] on the report.

mod checks;

use std::collections::BTreeSet;
use std::time::Instant;

use serde_json::Value;

use apiconform_core::config::ServiceConfig;
use apiconform_core::registry::{ModelRegistry, request_body_key, response_key};
use apiconform_core::report::StepReport;
use apiconform_core::testfile::Step;
use apiconform_core::vars::{MissingVariable, Params, VariableStore};
use apiconform_core::StepError;

use crate::http::{Call, HttpClient, Transport};

use checks::Subject;

/// Runs steps for one service; stateless across steps apart from the store
/// passed in.
pub struct StepRunner<'a, T> {
    client: &'a HttpClient<T>,
    registry: &'a ModelRegistry,
    service: &'a ServiceConfig,
}

impl<'a, T: Transport> StepRunner<'a, T> {
    #[must_use]
    pub const fn new(
        client: &'a HttpClient<T>,
        registry: &'a ModelRegistry,
        service: &'a ServiceConfig,
    ) -> Self {
        Self {
            client,
            registry,
            service,
        }
    }

    /// Run one step. The outcome is on the report: `error` is set iff the step
    /// failed.
    pub fn run(&self, step: &Step, store: &mut VariableStore) -> StepReport {
        let start = Instant::now();
        let mut report = StepReport::new(step);
        tracing::info!("Running {} ({})", step.name, report.operation);

        if let Err(e) = self.execute(step, store, &mut report) {
            tracing::warn!("{}: {e}", report.operation);
            report.fail(e);
        }
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        report
    }

    fn execute(
        &self,
        step: &Step,
        store: &mut VariableStore,
        report: &mut StepReport,
    ) -> Result<(), StepError> {
        let label = step.label();
        let version = self.client.version();
        let expected = step.expected_status()?;
        let polling = match step.polling {
            Some(spec) => Some((spec.interval()?, spec.timeout()?)),
            None => None,
        };

        let path_params = resolve(store, &step.path_params(), &label)?;
        let query_params = resolve(store, &step.query_params(), &label)?;

        let mut stored = BTreeSet::new();
        let body = match checks::request_json(step, &label, report)? {
            Some(mut body) => {
                store.substitute_body(&mut body).map_err(|e| unresolved(&e, &label))?;
                checks::schema(
                    self.registry,
                    version,
                    &request_body_key(&step.name),
                    &body,
                    Subject::RequestBody,
                    &label,
                    report,
                )?;
                stored.extend(extract(store, step, &body, &label)?);
                Some(body)
            }
            // Body verbs without a declared body send an empty object
            None if step.operation.has_body() => Some(Value::Object(serde_json::Map::new())),
            None => None,
        };

        let call = Call {
            operation: step.operation,
            endpoint: &step.endpoint,
            path_params: &path_params,
            query_params: &query_params,
            body: body.as_ref(),
        };
        let response = match polling {
            Some((interval, timeout)) => {
                self.client.poll(&call, interval, timeout, step.check_cancel())?
            }
            None => self.client.send(&call)?,
        };

        checks::status(&label, expected, response.status, report)?;
        if !(200..300).contains(&expected) {
            // Error responses carry no model to validate against
            checks::skip_response_schema(&label, expected, report);
            return Ok(());
        }

        let document = response.json().map_err(|e| {
            StepError::assertion(
                "JSON Decode Error",
                format!("Response body for {label} is not valid JSON"),
            )
            .with_detail(e.to_string())
        })?;

        let key = response_key(
            &step.name,
            &query_params,
            &self.service.view_endpoints,
            &self.service.default_view,
        );
        checks::schema(
            self.registry,
            version,
            &key,
            &document,
            Subject::Response,
            &label,
            report,
        )?;
        checks::filters(&step.filter, &document, &label, report)?;
        stored.extend(extract(store, step, &document, &label)?);

        for name in step.storage_vars.keys().filter(|n| !stored.contains(*n)) {
            tracing::warn!(
                "{label}: storage var {name} ({}) matched neither request body nor response",
                step.storage_vars[name]
            );
        }
        Ok(())
    }
}

fn resolve(store: &VariableStore, params: &[(String, String)], label: &str) -> Result<Params, StepError> {
    store
        .substitute_params(params)
        .map_err(|e| unresolved(&e, label))
}

fn unresolved(e: &MissingVariable, label: &str) -> StepError {
    StepError::validation(
        "Path param not found in storage vars",
        format!("Param {} not found in storage vars. {label} failed", e.param),
    )
    .with_detail(e.to_string())
}

fn extract(
    store: &mut VariableStore,
    step: &Step,
    document: &Value,
    label: &str,
) -> Result<Vec<String>, StepError> {
    store.extract(&step.storage_vars, document).map_err(|e| {
        StepError::validation(
            "Invalid storage path",
            format!("storage_vars of {label} has a malformed path"),
        )
        .with_detail(e.to_string())
    })
}
