//! Formloom Node Library
//!
//! Typed node execution for workflow runs.
//!
//! This crate provides:
//! - A closed set of node kinds: question, compute, branch, template, http
//! - Dispatch through [`NodeExecutor`] with per-node timing
//! - Pluggable transport, connection and template providers
//! - Bounded retry with backoff and retryable/non-retryable classification
//!
//! Every kind except http is a pure function over the run context; http
//! is the only node that performs external I/O.

pub mod connection;
pub mod error;
pub mod executor;
pub mod kinds;
pub mod node;
pub mod output;
pub mod provider;
pub mod transport;

pub use connection::{ApiConnection, ConnectionCache, ConnectionProvider, RetryPolicy};
pub use error::NodeError;
pub use executor::NodeExecutor;
pub use node::{Node, NodeConfig, NodeKind};
pub use output::{HttpNodeResponse, NodeOutput};
pub use provider::TemplateProvider;
pub use transport::{HttpMethod, HttpTransport, ReqwestTransport};
