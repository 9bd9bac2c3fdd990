//! Branch nodes route control flow.
//!
//! Arms are evaluated in declared order against the run context; the
//! first arm whose condition holds names the successor. A fallthrough
//! successor is optional, but a branch that matches nothing and has no
//! fallthrough is a configuration fault, not a silent no-op.

use formloom_engine::logic::{Condition, ConditionEvaluator};
use formloom_engine::run::EvalContext;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::NodeError;
use crate::node::Node;
use crate::output::NodeOutput;

/// One routing arm: a condition and the successor it selects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchArm {
    /// Condition guarding this arm.
    pub when: Condition,

    /// Successor node id to follow when the condition holds.
    pub goto: String,
}

/// Config for a branch node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Arms, tried in order.
    pub arms: Vec<BranchArm>,

    /// Successor when no arm matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<String>,
}

/// Pick the successor for this branch. The output value is the chosen
/// successor's id as a JSON string.
pub fn execute(
    node: &Node,
    config: &BranchConfig,
    evaluator: &ConditionEvaluator,
    ctx: &EvalContext,
) -> Result<NodeOutput, NodeError> {
    for arm in &config.arms {
        if evaluator.evaluate(&arm.when, ctx) {
            tracing::debug!(node_id = %node.id, goto = %arm.goto, "branch arm matched");
            return Ok(NodeOutput::new(&node.id, json!(arm.goto)));
        }
    }

    match &config.otherwise {
        Some(fallback) => Ok(NodeOutput::new(&node.id, json!(fallback))),
        None => Err(NodeError::Configuration(format!(
            "branch '{}' matched no arm and declares no otherwise",
            node.id
        ))),
    }
}
