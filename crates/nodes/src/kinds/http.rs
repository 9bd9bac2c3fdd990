//! Http nodes call externally configured APIs.
//!
//! The connection is resolved by project id and name through the cache,
//! then path, query, headers and body are templated against the run
//! context before the first attempt. Retries follow the connection's
//! policy: timeouts, connection failures, rate limiting and server
//! errors are retryable; any other client error is surfaced immediately.
//! A node whose workflow has no project fails before any network call.

use std::collections::HashMap;

use formloom_engine::run::EvalContext;
use formloom_engine::template::TemplateRenderer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ApiConnection, ConnectionCache, ConnectionProvider};
use crate::error::NodeError;
use crate::node::Node;
use crate::output::{HttpNodeResponse, NodeOutput};
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Config for an http node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Named connection to resolve under the workflow's project.
    pub connection: String,

    /// HTTP method, GET when omitted.
    #[serde(default)]
    pub method: HttpMethod,

    /// Path appended to the connection's base URL; templated.
    #[serde(default)]
    pub path: String,

    /// Query parameters; values are templated.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub query: HashMap<String, String>,

    /// Extra headers merged over the connection's defaults; templated.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// JSON body; string leaves are templated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Call the configured API and return `{status, body, headers}`.
pub async fn execute(
    node: &Node,
    config: &HttpConfig,
    transport: &dyn HttpTransport,
    connections: &dyn ConnectionProvider,
    cache: &ConnectionCache,
    renderer: &TemplateRenderer,
    ctx: &EvalContext,
) -> Result<NodeOutput, NodeError> {
    // No project, no connection. Checked before anything touches the wire.
    let project_id = ctx.project_id.as_deref().ok_or_else(|| {
        NodeError::Configuration(format!(
            "http node '{}' needs connection '{}' but the workflow has no project",
            node.id, config.connection
        ))
    })?;

    let connection = resolve_connection(config, connections, cache, project_id).await?;
    let request = build_request(node, config, &connection, renderer, ctx)?;

    tracing::debug!(
        node_id = %node.id,
        url = %request.url,
        method = ?request.method,
        "Executing HTTP request"
    );

    let policy = &connection.retry;
    let mut attempt: u32 = 0;
    loop {
        let retry_reason = match transport.send(request.clone()).await {
            Ok(response) if (200..300).contains(&response.status) => {
                return success_output(node, response);
            }
            Ok(response) if is_retryable_status(response.status) => {
                format!("HTTP {} from '{}'", response.status, connection.name)
            }
            Ok(response) => {
                return Err(NodeError::NonRetryableIntegration(format!(
                    "HTTP {} from '{}'",
                    response.status, connection.name
                )));
            }
            Err(err @ (TransportError::Timeout(_) | TransportError::Connect(_))) => {
                err.to_string()
            }
            Err(other) => {
                return Err(NodeError::NonRetryableIntegration(other.to_string()));
            }
        };

        if attempt >= policy.max_retries {
            return Err(NodeError::RetryableIntegration(format!(
                "{} after {} attempts",
                retry_reason,
                attempt + 1
            )));
        }

        let delay = policy.delay(attempt);
        tracing::debug!(
            node_id = %node.id,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            reason = %retry_reason,
            "Retrying HTTP request"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Cache-first connection lookup; a configured-but-unknown name is fatal.
async fn resolve_connection(
    config: &HttpConfig,
    connections: &dyn ConnectionProvider,
    cache: &ConnectionCache,
    project_id: &str,
) -> Result<ApiConnection, NodeError> {
    if let Some(connection) = cache.get(project_id, &config.connection).await {
        return Ok(connection);
    }

    let connection = connections
        .connection(project_id, &config.connection)
        .await
        .map_err(|e| NodeError::Configuration(format!("connection lookup failed: {}", e)))?
        .ok_or_else(|| {
            NodeError::Configuration(format!(
                "connection '{}' is not configured for project {}",
                config.connection, project_id
            ))
        })?;

    cache
        .put(project_id, &config.connection, connection.clone())
        .await;
    Ok(connection)
}

/// Template path, query, headers and body into one resolved request.
fn build_request(
    node: &Node,
    config: &HttpConfig,
    connection: &ApiConnection,
    renderer: &TemplateRenderer,
    ctx: &EvalContext,
) -> Result<HttpRequest, NodeError> {
    let tpl_ctx = ctx.template_context();

    let path = renderer.render(&config.path, &tpl_ctx)?;
    let mut url = join_url(&connection.base_url, &path);

    if !config.query.is_empty() {
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(config.query.len());
        for (key, value) in &config.query {
            pairs.push((key.clone(), renderer.render(value, &tpl_ctx)?));
        }
        pairs.sort();
        url = reqwest::Url::parse_with_params(&url, &pairs)
            .map_err(|e| {
                NodeError::Configuration(format!(
                    "http node '{}' produced an invalid URL: {}",
                    node.id, e
                ))
            })?
            .to_string();
    }

    let mut headers = connection.default_headers.clone();
    for (key, value) in &config.headers {
        headers.insert(key.clone(), renderer.render(value, &tpl_ctx)?);
    }

    let body = match &config.body {
        Some(body) => Some(renderer.render_value(body, &tpl_ctx)?),
        None => None,
    };

    Ok(HttpRequest {
        method: config.method,
        url,
        headers,
        body,
        timeout: connection.timeout(),
    })
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Rate limiting and server errors are worth another attempt.
fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn success_output(node: &Node, response: HttpResponse) -> Result<NodeOutput, NodeError> {
    let body = serde_json::from_str(&response.body_text)
        .unwrap_or(Value::String(response.body_text));

    let output = HttpNodeResponse {
        status: response.status,
        body,
        headers: response.headers,
    };
    Ok(NodeOutput::new(&node.id, serde_json::to_value(output)?))
}
