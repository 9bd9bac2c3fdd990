//! Template nodes render documents from run answers.
//!
//! The template body comes either inline (`source`) or from the
//! tenant-scoped template provider (`template_id`); declaring both or
//! neither is a configuration fault. Placeholders resolve by step id or
//! alias; unresolved ones render empty and come back as warnings on the
//! output instead of failing the node.

use formloom_engine::run::EvalContext;
use formloom_engine::template::TemplateRenderer;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::NodeError;
use crate::node::Node;
use crate::output::NodeOutput;
use crate::provider::TemplateProvider;

/// Config for a template node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemplateConfig {
    /// Inline template body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Stored template to fetch from the tenant's provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
}

/// Render the node's template against the run context.
pub async fn execute(
    node: &Node,
    config: &TemplateConfig,
    renderer: &TemplateRenderer,
    provider: &dyn TemplateProvider,
    ctx: &EvalContext,
) -> Result<NodeOutput, NodeError> {
    let source = match (&config.source, &config.template_id) {
        (Some(_), Some(_)) => {
            return Err(NodeError::Configuration(format!(
                "template '{}' declares both source and template_id",
                node.id
            )));
        }
        (None, None) => {
            return Err(NodeError::Configuration(format!(
                "template '{}' declares neither source nor template_id",
                node.id
            )));
        }
        (Some(source), None) => source.clone(),
        (None, Some(template_id)) => provider
            .template(&ctx.tenant_id, template_id)
            .await
            .map_err(|e| NodeError::Configuration(format!("template lookup failed: {}", e)))?
            .ok_or_else(|| {
                NodeError::Configuration(format!(
                    "template '{}' not found for tenant {}",
                    template_id, ctx.tenant_id
                ))
            })?,
    };

    let (rendered, warnings) = renderer.render_with_warnings(&source, &ctx.template_context())?;
    if !warnings.is_empty() {
        tracing::warn!(
            node_id = %node.id,
            warnings = warnings.len(),
            "template rendered with unresolved placeholders"
        );
    }

    Ok(NodeOutput::new(&node.id, json!(rendered)).with_warnings(warnings))
}
