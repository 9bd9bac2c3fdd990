//! Compute nodes derive one value from the run context.
//!
//! The configured script sees every answer under its step id and alias
//! spellings, runs inside the sandboxed script runner with an operation
//! and wall-clock budget, and returns a single value. The context itself
//! is never written.

use formloom_engine::config::EngineConfig;
use formloom_engine::run::EvalContext;
use formloom_engine::script::ScriptRunner;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::node::Node;
use crate::output::NodeOutput;

/// Config for a compute node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Script body evaluated for the derived value.
    pub script: String,

    /// Wall-clock budget override in milliseconds, clamped to the
    /// engine-wide ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Evaluate the node's script over a read-only copy of the context.
pub fn execute(
    node: &Node,
    config: &ComputeConfig,
    runner: &ScriptRunner,
    engine_config: &EngineConfig,
    ctx: &EvalContext,
) -> Result<NodeOutput, NodeError> {
    let inputs = ctx.template_context();
    let budget = engine_config.block_timeout(config.timeout_ms);
    let value = runner.eval(&config.script, &inputs, budget)?;
    Ok(NodeOutput::new(&node.id, value))
}
