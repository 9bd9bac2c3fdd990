//! Node execution error types.

use thiserror::Error;

/// Errors that can occur during node execution.
///
/// Integration failures carry their retry classification: the http kind
/// retries [`NodeError::RetryableIntegration`] per connection policy and
/// surfaces [`NodeError::NonRetryableIntegration`] immediately.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Node misconfigured: unknown type, missing connection/template
    /// reference. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Node input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Script evaluation error.
    #[error("Script error: {0}")]
    Script(String),

    /// Upstream timeout or rate limit; eligible for retry.
    #[error("Retryable integration error: {0}")]
    RetryableIntegration(String),

    /// Upstream rejected the request; retrying cannot help.
    #[error("Non-retryable integration error: {0}")]
    NonRetryableIntegration(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl NodeError {
    /// Whether the http kind may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::RetryableIntegration(_))
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            NodeError::RetryableIntegration(e.to_string())
        } else {
            NodeError::NonRetryableIntegration(e.to_string())
        }
    }
}

impl From<formloom_engine::script::ScriptError> for NodeError {
    fn from(e: formloom_engine::script::ScriptError) -> Self {
        NodeError::Script(e.to_string())
    }
}

impl From<formloom_engine::EngineError> for NodeError {
    fn from(e: formloom_engine::EngineError) -> Self {
        match e {
            formloom_engine::EngineError::Template(msg) => NodeError::Template(msg),
            formloom_engine::EngineError::Script(msg) => NodeError::Script(msg),
            other => NodeError::Configuration(other.to_string()),
        }
    }
}
