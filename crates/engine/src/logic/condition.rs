//! Condition trees for logic rules and branch nodes.
//!
//! A condition is either a leaf predicate over one variable or an and/or
//! combination of children. Operand names are step aliases or step ids;
//! resolution happens at evaluation time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Comparison operator for simple conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equality check.
    #[default]
    Equals,
    /// Inequality check.
    NotEquals,
    /// Substring or membership check.
    Contains,
    /// Negated substring or membership check.
    NotContains,
    /// Greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than.
    LessThan,
    /// Less than or equal.
    LessOrEqual,
    /// Value is missing, null or empty.
    IsEmpty,
    /// Value is present and non-empty.
    IsNotEmpty,
    /// Value occurs in the right-hand list.
    In,
    /// Value does not occur in the right-hand list.
    NotIn,
    /// Regex match on the string form.
    Matches,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Equals => "equals",
            CompareOp::NotEquals => "not_equals",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "not_contains",
            CompareOp::GreaterThan => "greater_than",
            CompareOp::GreaterOrEqual => "greater_or_equal",
            CompareOp::LessThan => "less_than",
            CompareOp::LessOrEqual => "less_or_equal",
            CompareOp::IsEmpty => "is_empty",
            CompareOp::IsNotEmpty => "is_not_empty",
            CompareOp::In => "in",
            CompareOp::NotIn => "not_in",
            CompareOp::Matches => "matches",
        };
        write!(f, "{}", s)
    }
}

/// How compound children combine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    And,
    Or,
}

/// Condition tree evaluated against run answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Leaf predicate over one variable.
    Simple {
        /// Step alias or id the left-hand side resolves from.
        variable: String,

        /// Operator.
        #[serde(default)]
        op: CompareOp,

        /// Right-hand side (absent for is_empty / is_not_empty).
        #[serde(default)]
        value: Option<serde_json::Value>,
    },

    /// And/or combination of child conditions.
    Compound {
        /// Combination mode.
        combinator: Combinator,

        /// Child conditions, evaluated left to right.
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Leaf predicate shorthand.
    pub fn simple(
        variable: impl Into<String>,
        op: CompareOp,
        value: Option<serde_json::Value>,
    ) -> Self {
        Condition::Simple {
            variable: variable.into(),
            op,
            value,
        }
    }

    /// All children must hold.
    pub fn all(children: Vec<Condition>) -> Self {
        Condition::Compound {
            combinator: Combinator::And,
            children,
        }
    }

    /// Any child suffices.
    pub fn any(children: Vec<Condition>) -> Self {
        Condition::Compound {
            combinator: Combinator::Or,
            children,
        }
    }

    /// Every variable name referenced anywhere in the tree, deduplicated.
    pub fn referenced_variables(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Condition::Simple { variable, .. } => {
                out.insert(variable.as_str());
            }
            Condition::Compound { children, .. } => {
                for child in children {
                    child.collect_variables(out);
                }
            }
        }
    }
}
