//! Suite runner: selection, per-file isolation and outcome classification
//!
//! Each selected file gets a fresh variable store and runs its steps in
//! order; the first failing step ends the file. A file's failure (of any
//! kind) never stops the remaining files.

mod loader;

pub use loader::{
    LoadError, LoadedFile, TEMPLATE_DIR, collect_test_files, expand_file, read_test_file,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use apiconform_core::config::Config;
use apiconform_core::registry::{ModelRegistry, RegistryError};
use apiconform_core::report::{FileReport, FileStatus, ReportSink};
use apiconform_core::selection::Selection;
use apiconform_core::vars::VariableStore;
use apiconform_core::{StepError, SuiteSummary};

use crate::http::{HttpClient, Transport};
use crate::step::StepRunner;

/// Runs test files against one server and API version.
pub struct SuiteRunner<T> {
    transport: T,
    config: Config,
    selection: Selection,
    registries: BTreeMap<String, ModelRegistry>,
}

impl<T: Transport> SuiteRunner<T> {
    /// Build the runner, loading the model registry of every configured service.
    ///
    /// # Errors
    ///
    /// Returns error if a configured schema document cannot be loaded.
    pub fn new(transport: T, config: Config) -> Result<Self, RegistryError> {
        let mut registries = BTreeMap::new();
        for (name, service) in &config.services {
            let registry = ModelRegistry::from_service(service, &config.base_dir)?;
            tracing::debug!("service {name}: {} models", registry.len());
            registries.insert(name.clone(), registry);
        }
        Ok(Self::with_registries(transport, config, registries))
    }

    /// Build the runner from prebuilt registries, keyed by service name.
    #[must_use]
    pub fn with_registries(
        transport: T,
        config: Config,
        registries: BTreeMap<String, ModelRegistry>,
    ) -> Self {
        Self {
            transport,
            selection: Selection::from_config(&config),
            config,
            registries,
        }
    }

    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub fn registry(&self, service: &str) -> Option<&ModelRegistry> {
        self.registries.get(service)
    }

    /// Run every file in order, handing results to `sink`.
    pub fn run(&self, files: &[PathBuf], sink: &mut dyn ReportSink) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for (index, path) in files.iter().enumerate() {
            tracing::info!("Initiating test {} for {}", index + 1, path.display());
            let report = self.run_file(path, sink);
            match (report.status, &report.error) {
                (FileStatus::Passed, _) => {
                    tracing::info!("Test for {} successful", report.path);
                    summary.record_passed(&report.path);
                }
                (FileStatus::Skipped, _) => {
                    tracing::info!(
                        "Skipping {}: {}",
                        report.path,
                        report.skip_reason.as_deref().unwrap_or_default()
                    );
                    summary.record_skipped(&report.path);
                }
                (FileStatus::Failed, error) => {
                    let kind = error.as_ref().map_or(apiconform_core::ErrorKind::Validation, |e| e.kind);
                    tracing::error!(
                        "Test for {} failed ({kind}): {}",
                        report.path,
                        error.as_ref().map(ToString::to_string).unwrap_or_default()
                    );
                    summary.record_failed(&report.path, kind);
                }
            }
            sink.file_finished(&report);
        }
        summary
    }

    /// Run one file in a fresh variable store.
    pub fn run_file(&self, path: &Path, sink: &mut dyn ReportSink) -> FileReport {
        let start = Instant::now();
        let display = path.display().to_string();

        let file = match read_test_file(path) {
            Ok(file) => file,
            Err(e) => {
                let mut report = FileReport::new(&display, None);
                report.fail(StepError::from(e));
                return report;
            }
        };

        let mut report = FileReport::new(&display, Some(&file));
        if let Err(reason) = self.selection.check(&file) {
            report.skip(reason.to_string());
            return report;
        }

        // Templates are only expanded for selected files
        let loaded = match expand_file(path, file) {
            Ok(loaded) => loaded,
            Err(e) => {
                report.fail(StepError::from(e));
                return report;
            }
        };

        if let Err(e) = self.execute(&loaded, &display, &mut report, sink) {
            report.fail(e);
        }
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        report
    }

    fn execute(
        &self,
        loaded: &LoadedFile,
        display: &str,
        report: &mut FileReport,
        sink: &mut dyn ReportSink,
    ) -> Result<(), StepError> {
        let service_name = &loaded.file.service;
        let service = self.config.service(service_name).map_err(|e| {
            StepError::validation("Unknown service", format!("{display}: {e}"))
        })?;
        let empty = ModelRegistry::new();
        let registry = self.registries.get(service_name).unwrap_or(&empty);

        let client = HttpClient::new(&self.transport, &self.config.server, &self.config.version)
            .with_headers(service.headers.clone())
            .with_polling_states(service.polling.clone());
        let runner = StepRunner::new(&client, registry, service);
        let mut store = VariableStore::new();

        for (index, step) in loaded.steps.iter().enumerate() {
            tracing::info!("Running sub-job {} -> {}", index + 1, step.name);
            let step_report = runner.run(step, &mut store);
            sink.step_finished(display, &step_report);
            let error = step_report.error.clone();
            report.steps.push(step_report);
            if let Some(error) = error {
                return Err(error);
            }
        }
        Ok(())
    }
}
