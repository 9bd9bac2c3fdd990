//! Logic rule evaluation.
//!
//! This module derives dynamic behavior from workflow rules:
//!
//! - **Condition**: declarative condition trees (simple and compound)
//! - **Evaluator**: pure predicate evaluation with absence fail-closed
//! - **Rules**: effective requiredness and visibility with hide dominance

pub mod condition;
pub mod evaluator;
pub mod rules;

pub use condition::{Combinator, CompareOp, Condition};
pub use evaluator::ConditionEvaluator;
pub use rules::{RequiredOutcome, RuleEngine, RuleWarning, VisibilityOutcome};
