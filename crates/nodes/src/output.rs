//! Node execution result types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Node that produced this output.
    pub node_id: String,

    /// Output value (kind-specific).
    pub value: serde_json::Value,

    /// Non-fatal findings, e.g. unresolved template placeholders.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,

    /// Execution duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl NodeOutput {
    /// Create an output for a node.
    pub fn new(node_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            node_id: node_id.into(),
            value,
            warnings: Vec::new(),
            duration_ms: None,
        }
    }

    /// Attach warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Set the execution duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Response shape returned by the http kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpNodeResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body, parsed as JSON when possible, raw text otherwise.
    pub body: serde_json::Value,

    /// Response headers.
    pub headers: HashMap<String, String>,
}

impl HttpNodeResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
