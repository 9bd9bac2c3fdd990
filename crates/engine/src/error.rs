//! Error types for the formloom engine.
//!
//! A single enum covers every failure the engine surfaces. Rule evaluation
//! and transform blocks never raise through it (they degrade to warnings and
//! per-block failures); only run-level problems reach the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A required step that had no usable value at completion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissingStep {
    /// Canonical step id.
    pub step_id: String,

    /// Human-readable alias, when the step has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Application-level errors for the workflow engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Workflow run does not exist.
    #[error("Workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// Run is already completed; its values are frozen.
    #[error("Workflow run already completed: {0}")]
    AlreadyCompleted(Uuid),

    /// Completion rejected: effectively-required steps have no value.
    #[error("Required steps missing values: {}", format_missing(.missing))]
    MissingValues { missing: Vec<MissingStep> },

    /// Definition-level validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transform script error.
    #[error("Script error: {0}")]
    Script(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Persistence-layer error.
    #[error("Store error: {0}")]
    Store(String),

    /// Parse error (YAML or JSON workflow definitions).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

fn format_missing(missing: &[MissingStep]) -> String {
    missing
        .iter()
        .map(|m| match &m.alias {
            Some(alias) => format!("{} ({})", m.step_id, alias),
            None => m.step_id.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}
