//! Blocking reqwest transport

use std::time::Duration;

use apiconform_core::testfile::Operation;

use super::{HttpRequest, HttpResponse, Transport, TransportError};

/// [`Transport`] over `reqwest::blocking`.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built (TLS backend failure).
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

fn method(operation: Operation) -> reqwest::Method {
    match operation {
        Operation::Get => reqwest::Method::GET,
        Operation::Post => reqwest::Method::POST,
        Operation::Put => reqwest::Method::PUT,
        Operation::Patch => reqwest::Method::PATCH,
        Operation::Delete => reqwest::Method::DELETE,
    }
}

fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_builder() {
        TransportError::Request(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut req = self.client.request(method(request.operation), &request.url);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().map_err(|e| classify(&e))?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| classify(&e))?;
        Ok(HttpResponse { status, body })
    }
}
