//! Run evaluation and completion.
//!
//! This module owns the per-run execution flow:
//!
//! - **Context**: the read-only answer view handed to every evaluation
//! - **Orchestrator**: the completion pass over store, blocks and rules

pub mod context;
pub mod orchestrator;

pub use context::EvalContext;
pub use orchestrator::{RunCompletion, RunOrchestrator, SectionDerivation};
