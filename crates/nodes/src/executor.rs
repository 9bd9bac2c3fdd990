//! Node dispatch.
//!
//! [`NodeExecutor`] owns the shared machinery every node kind draws on:
//! the transport and connection cache for http, the template renderer and
//! provider, the sandboxed script runner and the condition evaluator. One
//! executor serves many runs; per-run state arrives through the
//! [`EvalContext`] argument, so concurrent executions never share
//! mutable state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use formloom_engine::config::EngineConfig;
use formloom_engine::logic::ConditionEvaluator;
use formloom_engine::run::EvalContext;
use formloom_engine::script::ScriptRunner;
use formloom_engine::template::TemplateRenderer;
use serde_json::Value;

use crate::connection::{ConnectionCache, ConnectionProvider};
use crate::error::NodeError;
use crate::kinds::{branch, compute, http, question, template};
use crate::node::{Node, NodeConfig};
use crate::output::NodeOutput;
use crate::provider::TemplateProvider;
use crate::transport::HttpTransport;

/// Executes nodes of every kind against a run context.
pub struct NodeExecutor {
    transport: Arc<dyn HttpTransport>,
    connections: Arc<dyn ConnectionProvider>,
    templates: Arc<dyn TemplateProvider>,
    cache: ConnectionCache,
    evaluator: ConditionEvaluator,
    script_runner: ScriptRunner,
    renderer: TemplateRenderer,
    config: EngineConfig,
}

impl NodeExecutor {
    /// Build an executor over the given providers.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        connections: Arc<dyn ConnectionProvider>,
        templates: Arc<dyn TemplateProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache: ConnectionCache::new(
                Duration::from_secs(config.connection_cache_ttl_secs),
                config.connection_cache_capacity,
            ),
            evaluator: ConditionEvaluator::new(),
            script_runner: ScriptRunner::new(config.script_max_operations),
            renderer: TemplateRenderer::new(),
            transport,
            connections,
            templates,
            config,
        }
    }

    /// Execute one node. `user_inputs` carries raw answers keyed by node
    /// id; only question nodes read it.
    pub async fn execute(
        &self,
        node: &Node,
        ctx: &EvalContext,
        user_inputs: &HashMap<String, Value>,
    ) -> Result<NodeOutput, NodeError> {
        let started = Instant::now();
        tracing::debug!(node_id = %node.id, kind = %node.kind(), "Executing node");

        let output = match &node.config {
            NodeConfig::Question(config) => question::execute(node, config, user_inputs),
            NodeConfig::Compute(config) => {
                compute::execute(node, config, &self.script_runner, &self.config, ctx)
            }
            NodeConfig::Branch(config) => branch::execute(node, config, &self.evaluator, ctx),
            NodeConfig::Template(config) => {
                template::execute(node, config, &self.renderer, self.templates.as_ref(), ctx)
                    .await
            }
            NodeConfig::Http(config) => {
                http::execute(
                    node,
                    config,
                    self.transport.as_ref(),
                    self.connections.as_ref(),
                    &self.cache,
                    &self.renderer,
                    ctx,
                )
                .await
            }
        }?;

        Ok(output.with_duration(started.elapsed().as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ApiConnection, MemoryConnectionProvider, RetryPolicy};
    use crate::provider::MemoryTemplateProvider;
    use crate::transport::mock::MockTransport;
    use formloom_engine::workflow::types::{Phase, Workflow, WorkflowRun};
    use serde_json::json;

    fn make_workflow(project: Option<&str>) -> Workflow {
        serde_json::from_value(json!({
            "id": "5f0a7d52-9c1b-48e3-8d6f-2f1f3f9b7c44",
            "name": "Executor test",
            "tenant_id": "t-1",
            "project_id": project,
            "sections": [{
                "id": "sec-1",
                "steps": [
                    {"id": "s-qty", "kind": "number", "alias": "qty"},
                    {"id": "s-email", "kind": "short_text", "alias": "email"}
                ]
            }]
        }))
        .unwrap()
    }

    fn make_context(project: Option<&str>) -> EvalContext {
        let workflow = make_workflow(project);
        let run = WorkflowRun::new(workflow.id);
        let values = HashMap::from([
            ("s-qty".to_string(), json!(4)),
            ("s-email".to_string(), json!("ada@example.com")),
        ]);
        EvalContext::for_run(&workflow, &run, values, Phase::OnWorkflowComplete)
    }

    struct Fixture {
        transport: Arc<MockTransport>,
        executor: NodeExecutor,
    }

    async fn make_fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let connections = Arc::new(MemoryConnectionProvider::new());
        connections
            .put(
                "p-1",
                ApiConnection {
                    name: "crm".to_string(),
                    base_url: "https://crm.example.com".to_string(),
                    default_headers: HashMap::new(),
                    timeout_ms: 1000,
                    retry: RetryPolicy {
                        max_retries: 1,
                        initial_delay_ms: 1,
                        max_delay_ms: 2,
                        ..Default::default()
                    },
                },
            )
            .await;
        let templates = Arc::new(MemoryTemplateProvider::new());
        templates.put("t-1", "receipt", "Qty: {{ qty }}").await;

        Fixture {
            transport: transport.clone(),
            executor: NodeExecutor::new(
                transport,
                connections,
                templates,
                EngineConfig::default(),
            ),
        }
    }

    #[tokio::test]
    async fn test_question_dispatch() {
        let fixture = make_fixture().await;
        let node = Node::from_value(json!({
            "id": "n-email",
            "type": "question",
            "trim": true
        }))
        .unwrap();
        let inputs = HashMap::from([("n-email".to_string(), json!("  x@y.z "))]);

        let out = fixture
            .executor
            .execute(&node, &make_context(None), &inputs)
            .await
            .unwrap();

        assert_eq!(out.value, json!("x@y.z"));
        assert!(out.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_compute_dispatch() {
        let fixture = make_fixture().await;
        let node = Node::from_value(json!({
            "id": "n-double",
            "type": "compute",
            "script": "qty * 2"
        }))
        .unwrap();

        let out = fixture
            .executor
            .execute(&node, &make_context(None), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(out.value, json!(8));
    }

    #[tokio::test]
    async fn test_branch_dispatch() {
        let fixture = make_fixture().await;
        let node = Node::from_value(json!({
            "id": "n-route",
            "type": "branch",
            "arms": [{
                "when": {"type": "simple", "variable": "qty", "op": "greater_than", "value": 3},
                "goto": "n-bulk"
            }],
            "otherwise": "n-single"
        }))
        .unwrap();

        let out = fixture
            .executor
            .execute(&node, &make_context(None), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(out.value, json!("n-bulk"));
    }

    #[tokio::test]
    async fn test_template_dispatch() {
        let fixture = make_fixture().await;
        let node = Node::from_value(json!({
            "id": "n-receipt",
            "type": "template",
            "template_id": "receipt"
        }))
        .unwrap();

        let out = fixture
            .executor
            .execute(&node, &make_context(None), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(out.value, json!("Qty: 4"));
    }

    #[tokio::test]
    async fn test_http_dispatch() {
        let fixture = make_fixture().await;
        fixture.transport.push_status(200, r#"{"ok": true}"#);
        let node = Node::from_value(json!({
            "id": "n-sync",
            "type": "http",
            "connection": "crm",
            "method": "POST",
            "path": "/contacts"
        }))
        .unwrap();

        let out = fixture
            .executor
            .execute(&node, &make_context(Some("p-1")), &HashMap::new())
            .await
            .unwrap();

        assert_eq!(fixture.transport.call_count(), 1);
        assert!(out.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_http_without_project_never_reaches_transport() {
        let fixture = make_fixture().await;
        let node = Node::from_value(json!({
            "id": "n-sync",
            "type": "http",
            "connection": "crm",
            "path": "/contacts"
        }))
        .unwrap();

        let err = fixture
            .executor
            .execute(&node, &make_context(None), &HashMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Configuration(_)));
        assert_eq!(fixture.transport.call_count(), 0);
    }
}
