//! Node model.
//!
//! A node's configuration is a closed tagged union keyed by `type`: each
//! kind carries its own typed payload, and an unknown type fails parsing
//! immediately. Adding a kind means adding a variant and its handler,
//! never widening a dynamic map.

use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::kinds::branch::BranchConfig;
use crate::kinds::compute::ComputeConfig;
use crate::kinds::http::HttpConfig;
use crate::kinds::question::QuestionConfig;
use crate::kinds::template::TemplateConfig;

/// Supported node kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Question,
    Compute,
    Branch,
    Template,
    Http,
}

impl NodeKind {
    const ALL: [(&'static str, NodeKind); 5] = [
        ("question", NodeKind::Question),
        ("compute", NodeKind::Compute),
        ("branch", NodeKind::Branch),
        ("template", NodeKind::Template),
        ("http", NodeKind::Http),
    ];

    /// Parse a kind from its wire name.
    pub fn parse(name: &str) -> Option<NodeKind> {
        Self::ALL
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, k)| *k)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Question => "question",
            NodeKind::Compute => "compute",
            NodeKind::Branch => "branch",
            NodeKind::Template => "template",
            NodeKind::Http => "http",
        };
        write!(f, "{}", s)
    }
}

/// Typed node configuration, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Surface a user answer, with optional normalization/validation.
    Question(QuestionConfig),

    /// Derive one value from a script over the context.
    Compute(ComputeConfig),

    /// Pick a successor by evaluating conditions.
    Branch(BranchConfig),

    /// Render an inline or stored template.
    Template(TemplateConfig),

    /// Call an external API through a project connection.
    Http(HttpConfig),
}

impl NodeConfig {
    /// The kind this configuration belongs to.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Question(_) => NodeKind::Question,
            NodeConfig::Compute(_) => NodeKind::Compute,
            NodeConfig::Branch(_) => NodeKind::Branch,
            NodeConfig::Template(_) => NodeKind::Template,
            NodeConfig::Http(_) => NodeKind::Http,
        }
    }
}

/// One executable node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node id, unique within its workflow.
    pub id: String,

    /// Typed configuration; `type` is the discriminant.
    #[serde(flatten)]
    pub config: NodeConfig,
}

impl Node {
    /// Parse a node from a JSON value, failing fast on unknown or
    /// malformed configuration.
    pub fn from_value(value: serde_json::Value) -> Result<Self, NodeError> {
        let node_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| NodeError::Configuration("node is missing a type".to_string()))?;

        if NodeKind::parse(&node_type).is_none() {
            return Err(NodeError::Configuration(format!(
                "unknown node type: {}",
                node_type
            )));
        }

        serde_json::from_value(value).map_err(|e| {
            NodeError::Configuration(format!("invalid {} node config: {}", node_type, e))
        })
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}
