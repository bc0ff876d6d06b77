//! apiconform-runner: execution engine for API conformance suites
//!
//! HTTP client (direct and polling requests behind a transport seam), step
//! runner, and suite runner with test-file loading.

pub mod http;
pub mod step;
pub mod suite;

pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
pub use step::StepRunner;
pub use suite::{LoadError, SuiteRunner, collect_test_files, expand_file, read_test_file};
