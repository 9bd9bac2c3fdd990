//! Question nodes surface the user's raw answer.
//!
//! The answer for a question node is read from `user_inputs` under the
//! node's own id. Declared normalization (trim, lowercase) runs before
//! validation; nothing here touches external services.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;
use crate::node::Node;
use crate::output::NodeOutput;

/// Config for a question node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuestionConfig {
    /// Reject an empty answer.
    #[serde(default)]
    pub required: bool,

    /// Strip surrounding whitespace from string answers.
    #[serde(default)]
    pub trim: bool,

    /// Lowercase string answers.
    #[serde(default)]
    pub lowercase: bool,

    /// Regex a string answer must match. Non-string answers are not
    /// pattern-checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Surface the user's answer for this node, normalized and validated.
pub fn execute(
    node: &Node,
    config: &QuestionConfig,
    user_inputs: &HashMap<String, Value>,
) -> Result<NodeOutput, NodeError> {
    let raw = user_inputs.get(&node.id).cloned().unwrap_or(Value::Null);

    let value = match raw {
        Value::String(s) => {
            let mut s = s;
            if config.trim {
                s = s.trim().to_string();
            }
            if config.lowercase {
                s = s.to_lowercase();
            }
            Value::String(s)
        }
        other => other,
    };

    if formloom_engine::logic::evaluator::is_empty_value(&value) {
        if config.required {
            return Err(NodeError::Validation(format!(
                "question '{}' has no answer",
                node.id
            )));
        }
        return Ok(NodeOutput::new(&node.id, value));
    }

    if let Some(pattern) = &config.pattern {
        if let Value::String(s) = &value {
            let re = Regex::new(pattern).map_err(|e| {
                NodeError::Configuration(format!(
                    "question '{}' has an invalid pattern: {}",
                    node.id, e
                ))
            })?;
            if !re.is_match(s) {
                return Err(NodeError::Validation(format!(
                    "answer for '{}' does not match the expected format",
                    node.id
                )));
            }
        }
    }

    Ok(NodeOutput::new(&node.id, value))
}
