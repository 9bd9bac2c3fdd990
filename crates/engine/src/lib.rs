//! Formloom Workflow Engine
//!
//! This crate provides the workflow-logic core for formloom, handling:
//!
//! - **Condition Evaluation**: declarative predicates over collected answers
//! - **Logic Rules**: dynamic visibility and requiredness with hide dominance
//! - **Transform Blocks**: sandboxed user scripts deriving values per phase
//! - **Run Completion**: validation and atomic finalization of workflow runs
//! - **Templates**: Jinja2-style rendering over run answers
//!
//! ## Architecture
//!
//! The engine is persistence-agnostic: hosts implement [`store::RunStore`]
//! and the orchestrator drives every completion pass against a snapshot
//! loaded through it. All evaluation is pure over that snapshot, so
//! concurrent completions of different runs never share mutable state.
//!
//! ## Modules
//!
//! - [`config`]: Engine limits loaded from environment variables
//! - [`error`]: Error types shared across the engine
//! - [`logic`]: Condition evaluation and rule application
//! - [`run`]: Evaluation context and the completion orchestrator
//! - [`script`]: Sandboxed script runner and transform blocks
//! - [`store`]: Persistence seam and the in-memory store
//! - [`template`]: Template rendering
//! - [`vars`]: Variable table resolving aliases and step ids
//! - [`workflow`]: Workflow model and YAML parser
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use formloom_engine::{
//!     config::EngineConfig,
//!     run::RunOrchestrator,
//!     store::MemoryRunStore,
//!     workflow::parse_workflow,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryRunStore::new());
//!     let workflow = parse_workflow(&std::fs::read_to_string("workflow.yaml")?)?;
//!     let workflow_id = workflow.id;
//!     store.put_workflow(workflow).await;
//!
//!     let run = store.create_run(workflow_id).await?;
//!     // ... record step values ...
//!     let orchestrator = RunOrchestrator::new(store, EngineConfig::from_env()?);
//!     let completion = orchestrator.complete_run(run.id, "user-1").await?;
//!     println!("completed at {:?}", completion.run.completed_at);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logic;
pub mod run;
pub mod script;
pub mod store;
pub mod template;
pub mod vars;
pub mod workflow;

pub use error::{EngineError, EngineResult};
pub use run::{RunCompletion, RunOrchestrator};
