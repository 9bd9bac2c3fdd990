//! HTTP transport seam.
//!
//! The http kind never owns a client; it sends through [`HttpTransport`]
//! so tests can count and script calls without any network.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// HTTP method.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::DELETE => Method::DELETE,
            HttpMethod::HEAD => Method::HEAD,
        }
    }
}

/// One outbound request, fully resolved.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,

    /// Absolute URL including query string.
    pub url: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// JSON body, when present.
    pub body: Option<serde_json::Value>,

    /// Per-attempt time budget.
    pub timeout: Duration,
}

/// Raw response before node-level interpretation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Body as text; the http kind parses JSON when it can.
    pub body_text: String,
}

/// Failure before any status code was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The attempt exceeded its time budget.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Anything else the client reported.
    #[error("transport error: {0}")]
    Other(String),
}

/// Sends requests on behalf of the http kind.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one attempt. Retrying is the caller's business.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport over a shared reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport with a custom client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body_text = response
            .text()
            .await
            .map_err(classify_reqwest_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body_text,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted transport for tests: replays queued responses and counts
    //! every call.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockTransport {
        calls: AtomicUsize,
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_status(&self, status: u16, body: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(HttpResponse {
                    status,
                    headers: HashMap::new(),
                    body_text: body.to_string(),
                }));
        }

        pub fn push_error(&self, error: TransportError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body_text: "{}".to_string(),
                }))
        }
    }
}
