//! Workflow definitions.
//!
//! This module provides the workflow model and its YAML parser:
//!
//! - **Types**: sections, steps, logic rules, transform blocks, runs
//! - **Parser**: YAML parsing and referential-integrity validation

pub mod parser;
pub mod types;

pub use parser::{parse_workflow, validate_workflow};
pub use types::{
    LogicRule, Phase, RuleAction, RuleTarget, Section, Step, StepKind, StepValue, TargetKind,
    TransformBlock, Workflow, WorkflowRun,
};
