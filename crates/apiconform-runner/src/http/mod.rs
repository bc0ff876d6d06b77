//! HTTP client: single request/response cycles and polling
//!
//! The wire is behind the [`Transport`] trait so the engine can be driven by
//! scripted transports in tests. URL building, header injection, polling and
//! failure classification live here; the transport only moves bytes.

mod transport;

pub use transport::ReqwestTransport;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use apiconform_core::config::PollingStates;
use apiconform_core::testfile::Operation;
use apiconform_core::vars::Params;
use apiconform_core::StepError;

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub operation: Operation,
    pub url: String,
    pub query: Params,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON. An empty (or whitespace-only) body decodes to
    /// an empty object.
    ///
    /// # Errors
    ///
    /// Returns error if a non-empty body is not valid JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.body)
    }
}

/// Transport-level failure: nothing about the server's conformance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error("{0}")]
    Other(String),
}

/// Moves one request over the wire.
pub trait Transport {
    /// # Errors
    ///
    /// Returns error on DNS, connection, TLS or I/O failure.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// `"1.2.3"` → `"v1"`.
///
/// # Errors
///
/// Returns a validation error if the version does not start with a numeric
/// major component.
pub fn major_version_segment(version: &str) -> Result<String, StepError> {
    version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u64>().ok())
        .map(|major| format!("v{major}"))
        .ok_or_else(|| {
            StepError::validation(
                "Invalid API version",
                format!("'{version}' has no numeric major version"),
            )
        })
}

/// `<server>/<vN><endpoint>` with `{key}` path segments substituted.
///
/// # Errors
///
/// Returns a validation error for a malformed version.
pub fn build_url(
    server: &str,
    version: &str,
    endpoint: &str,
    path_params: &[(String, String)],
) -> Result<String, StepError> {
    let mut path = endpoint.to_string();
    for (key, value) in path_params {
        path = path.replace(&format!("{{{key}}}"), value);
    }
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    let segment = major_version_segment(version)?;
    Ok(format!("{}/{segment}{path}", server.trim_end_matches('/')))
}

/// How one polled response is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Terminal state reached in normal mode
    Complete,
    /// Terminal state reached in cancel mode
    Canceled,
    Retry,
}

/// Success predicate for polled responses: status 200 and the state field in
/// the terminal set for the mode. Anything else (including a body that is not
/// JSON) is a retry.
#[must_use]
pub fn classify_poll(response: &HttpResponse, states: &PollingStates, check_cancel: bool) -> PollState {
    if response.status != 200 {
        return PollState::Retry;
    }
    let Ok(body) = response.json() else {
        return PollState::Retry;
    };
    let terminal = body
        .get(&states.state_field)
        .and_then(Value::as_str)
        .is_some_and(|state| states.terminal(check_cancel).iter().any(|s| s == state));
    match (terminal, check_cancel) {
        (false, _) => PollState::Retry,
        (true, true) => PollState::Canceled,
        (true, false) => PollState::Complete,
    }
}

/// One resolved call: what to send and where.
#[derive(Debug, Clone)]
pub struct Call<'a> {
    pub operation: Operation,
    pub endpoint: &'a str,
    pub path_params: &'a [(String, String)],
    pub query_params: &'a [(String, String)],
    pub body: Option<&'a Value>,
}

/// Sends requests for one service against one server and API version.
pub struct HttpClient<T> {
    transport: T,
    server: String,
    version: String,
    headers: BTreeMap<String, String>,
    polling: PollingStates,
}

impl<T: Transport> HttpClient<T> {
    #[must_use]
    pub fn new(transport: T, server: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            transport,
            server: server.into(),
            version: version.into(),
            headers: BTreeMap::new(),
            polling: PollingStates::default(),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_polling_states(mut self, polling: PollingStates) -> Self {
        self.polling = polling;
        self
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn request(&self, call: &Call<'_>) -> Result<HttpRequest, StepError> {
        Ok(HttpRequest {
            operation: call.operation,
            url: build_url(&self.server, &self.version, call.endpoint, call.path_params)?,
            query: call.query_params.to_vec(),
            headers: self.headers.clone(),
            body: call.body.cloned(),
        })
    }

    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, StepError> {
        self.transport.execute(request).map_err(|e| {
            StepError::infrastructure(
                "OS Error",
                format!("Connection error to {} {}", request.operation, request.url),
            )
            .with_detail(e.to_string())
        })
    }

    /// Issue one request.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error on transport failure, a validation error
    /// if the URL cannot be built.
    pub fn send(&self, call: &Call<'_>) -> Result<HttpResponse, StepError> {
        let request = self.request(call)?;
        tracing::info!(
            "Sending {} request to {}. Query parameters: {:?}",
            request.operation,
            request.url,
            request.query
        );
        let response = self.execute(&request)?;
        tracing::debug!("{} {} -> {}", request.operation, request.url, response.status);
        Ok(response)
    }

    /// Repeat the request until the polling predicate holds: check
    /// immediately, then every `interval` until `timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns an assertion error on timeout, an infrastructure error on
    /// transport failure (which aborts polling at once).
    pub fn poll(
        &self,
        call: &Call<'_>,
        interval: Duration,
        timeout: Duration,
        check_cancel: bool,
    ) -> Result<HttpResponse, StepError> {
        let request = self.request(call)?;
        tracing::info!(
            "Sending {} polling request to {}. Query parameters: {:?}",
            request.operation,
            request.url,
            request.query
        );

        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let response = self.execute(&request)?;
            match classify_poll(&response, &self.polling, check_cancel) {
                PollState::Retry => {
                    tracing::debug!(
                        "poll attempt {attempt}: status {}, not terminal; retrying",
                        response.status
                    );
                }
                state => {
                    tracing::info!("Polling finished after {attempt} attempts ({state:?})");
                    return Ok(response);
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(StepError::assertion(
                    "Polling Timeout Error",
                    format!("Polling timeout for {} {}", request.operation, request.url),
                )
                .with_detail(format!(
                    "{attempt} attempts over {:.1}s without a terminal state",
                    elapsed.as_secs_f64()
                )));
            }
            std::thread::sleep(interval.min(timeout - elapsed));
        }
    }
}
