//! Condition evaluation against a run context.
//!
//! Evaluation is pure and infallible: unresolvable operands behave as
//! absent values, and every predicate on an absent value is false except
//! `is_empty`, which is true. Rules referencing deleted steps therefore
//! fail closed instead of raising.

use crate::logic::condition::{Combinator, CompareOp, Condition};
use crate::run::context::EvalContext;
use crate::workflow::types::StepKind;

/// Evaluates condition trees against run answers.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a condition tree. Side-effect free.
    pub fn evaluate(&self, condition: &Condition, ctx: &EvalContext) -> bool {
        match condition {
            Condition::Simple { variable, op, value } => {
                self.evaluate_simple(variable, *op, value.as_ref(), ctx)
            }
            Condition::Compound { combinator, children } => match combinator {
                Combinator::And => children.iter().all(|c| self.evaluate(c, ctx)),
                Combinator::Or => children.iter().any(|c| self.evaluate(c, ctx)),
            },
        }
    }

    fn evaluate_simple(
        &self,
        variable: &str,
        op: CompareOp,
        rhs: Option<&serde_json::Value>,
        ctx: &EvalContext,
    ) -> bool {
        // Null and unresolvable both count as absent.
        let lhs = ctx.value(variable).filter(|v| !v.is_null());

        let Some(lhs) = lhs else {
            return matches!(op, CompareOp::IsEmpty);
        };

        let kind = ctx.kind_of(variable);

        match op {
            CompareOp::IsEmpty => is_empty_value(lhs),
            CompareOp::IsNotEmpty => !is_empty_value(lhs),
            CompareOp::Equals => match rhs {
                Some(rhs) => coerced_eq(lhs, rhs, kind),
                None => false,
            },
            CompareOp::NotEquals => match rhs {
                Some(rhs) => !coerced_eq(lhs, rhs, kind),
                None => false,
            },
            CompareOp::Contains => value_contains(lhs, rhs, kind),
            CompareOp::NotContains => match rhs {
                Some(_) => !value_contains(lhs, rhs, kind),
                None => false,
            },
            CompareOp::GreaterThan => compare_numeric(lhs, rhs, |a, b| a > b),
            CompareOp::GreaterOrEqual => compare_numeric(lhs, rhs, |a, b| a >= b),
            CompareOp::LessThan => compare_numeric(lhs, rhs, |a, b| a < b),
            CompareOp::LessOrEqual => compare_numeric(lhs, rhs, |a, b| a <= b),
            CompareOp::In => match rhs {
                Some(serde_json::Value::Array(items)) => {
                    items.iter().any(|item| coerced_eq(lhs, item, kind))
                }
                _ => false,
            },
            CompareOp::NotIn => match rhs {
                Some(serde_json::Value::Array(items)) => {
                    !items.iter().any(|item| coerced_eq(lhs, item, kind))
                }
                _ => false,
            },
            CompareOp::Matches => {
                let pattern = match rhs.and_then(|r| r.as_str()) {
                    Some(p) => p,
                    None => return false,
                };
                match regex::Regex::new(pattern) {
                    Ok(re) => re.is_match(&string_form(lhs)),
                    Err(e) => {
                        tracing::debug!(pattern = %pattern, error = %e, "invalid regex in condition, treating as no match");
                        false
                    }
                }
            }
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a value counts as empty: null, empty string, empty array or
/// empty object. Numbers and booleans are never empty.
pub fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        serde_json::Value::Number(_) | serde_json::Value::Bool(_) => false,
    }
}

/// Equality with coercion keyed by the step's declared kind.
fn coerced_eq(lhs: &serde_json::Value, rhs: &serde_json::Value, kind: Option<StepKind>) -> bool {
    match kind {
        Some(StepKind::Number) => match (value_to_f64(lhs), value_to_f64(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        Some(StepKind::Boolean) => match (value_to_bool(lhs), value_to_bool(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        _ => generic_eq(lhs, rhs),
    }
}

/// Kind-free equality: numeric and boolean forms compare across types,
/// everything else falls back to deep equality.
fn generic_eq(lhs: &serde_json::Value, rhs: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => {
            value_to_f64(lhs) == value_to_f64(rhs)
        }
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (value_to_f64(lhs), value_to_f64(rhs)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(_), Value::String(_)) | (Value::String(_), Value::Bool(_)) => {
            match (value_to_bool(lhs), value_to_bool(rhs)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => lhs == rhs,
    }
}

/// Membership for arrays, substring for everything else.
fn value_contains(
    lhs: &serde_json::Value,
    rhs: Option<&serde_json::Value>,
    kind: Option<StepKind>,
) -> bool {
    let Some(rhs) = rhs else {
        return false;
    };
    match lhs {
        serde_json::Value::Array(items) => items.iter().any(|item| coerced_eq(item, rhs, kind)),
        _ => string_form(lhs).contains(&string_form(rhs)),
    }
}

fn compare_numeric<F>(lhs: &serde_json::Value, rhs: Option<&serde_json::Value>, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    let rhs = match rhs.and_then(value_to_f64) {
        Some(n) => n,
        None => return false,
    };
    match value_to_f64(lhs) {
        Some(l) => cmp(l, rhs),
        None => false,
    }
}

/// Convert a JSON value to f64. Strings parse, booleans map to 1/0.
fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Normalize a JSON value to bool: yes/no, true/false, 1/0.
fn value_to_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_form(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::context::EvalContext;
    use crate::workflow::types::{Workflow, WorkflowRun};
    use serde_json::json;
    use std::collections::HashMap;

    fn make_ctx(values: Vec<(&str, serde_json::Value)>) -> EvalContext {
        let yaml = r#"
id: 1c6f8a3e-5d17-4b09-9d35-6a1f0e2b9c77
name: Evaluator test
tenant_id: t-1
sections:
  - id: sec-1
    steps:
      - id: s-age
        kind: number
        alias: age
      - id: s-attendance
        kind: choice
        alias: attendance
      - id: s-dietary
        kind: short_text
        alias: dietary
      - id: s-newsletter
        kind: boolean
        alias: newsletter
      - id: s-tags
        kind: multi_choice
        alias: tags
      - id: s-notes
        kind: long_text
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let run = WorkflowRun::new(workflow.id);
        let map: HashMap<String, serde_json::Value> = values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        EvalContext::for_run(&workflow, &run, map, Default::default())
    }

    fn eval(cond: &Condition, ctx: &EvalContext) -> bool {
        ConditionEvaluator::new().evaluate(cond, ctx)
    }

    #[test]
    fn test_equals_string() {
        let ctx = make_ctx(vec![("s-attendance", json!("yes"))]);
        let cond = Condition::simple("attendance", CompareOp::Equals, Some(json!("yes")));
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("attendance", CompareOp::Equals, Some(json!("no")));
        assert!(!eval(&cond, &ctx));
    }

    #[test]
    fn test_alias_and_id_are_equivalent() {
        let ctx = make_ctx(vec![("s-attendance", json!("yes"))]);
        let by_alias = Condition::simple("attendance", CompareOp::Equals, Some(json!("yes")));
        let by_id = Condition::simple("s-attendance", CompareOp::Equals, Some(json!("yes")));
        assert_eq!(eval(&by_alias, &ctx), eval(&by_id, &ctx));
        assert!(eval(&by_id, &ctx));
    }

    #[test]
    fn test_number_coercion_from_string() {
        let ctx = make_ctx(vec![("s-age", json!("42"))]);
        let cond = Condition::simple("age", CompareOp::Equals, Some(json!(42)));
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("age", CompareOp::GreaterThan, Some(json!(17)));
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("age", CompareOp::LessOrEqual, Some(json!(41)));
        assert!(!eval(&cond, &ctx));
    }

    #[test]
    fn test_boolean_normalization() {
        let ctx = make_ctx(vec![("s-newsletter", json!("yes"))]);
        let cond = Condition::simple("newsletter", CompareOp::Equals, Some(json!(true)));
        assert!(eval(&cond, &ctx));
        let ctx = make_ctx(vec![("s-newsletter", json!(false))]);
        let cond = Condition::simple("newsletter", CompareOp::Equals, Some(json!("no")));
        assert!(eval(&cond, &ctx));
    }

    #[test]
    fn test_absent_fails_closed() {
        let ctx = make_ctx(vec![]);
        for op in [
            CompareOp::Equals,
            CompareOp::NotEquals,
            CompareOp::Contains,
            CompareOp::NotContains,
            CompareOp::GreaterThan,
            CompareOp::IsNotEmpty,
            CompareOp::In,
            CompareOp::NotIn,
            CompareOp::Matches,
        ] {
            let cond = Condition::simple("dietary", op, Some(json!("x")));
            assert!(!eval(&cond, &ctx), "op {} should be false on absent", op);
        }
    }

    #[test]
    fn test_is_empty_on_absent_and_null() {
        let ctx = make_ctx(vec![]);
        let cond = Condition::simple("dietary", CompareOp::IsEmpty, None);
        assert!(eval(&cond, &ctx));

        let ctx = make_ctx(vec![("s-dietary", json!(null))]);
        assert!(eval(&cond, &ctx));

        let ctx = make_ctx(vec![("s-dietary", json!("vegan"))]);
        assert!(!eval(&cond, &ctx));
    }

    #[test]
    fn test_dangling_reference_never_throws() {
        // References a step that no longer exists anywhere in the workflow.
        let ctx = make_ctx(vec![("s-age", json!(30))]);
        let dangling = Condition::simple("ghost", CompareOp::Equals, Some(json!("x")));
        assert!(!eval(&dangling, &ctx));

        let and = Condition::all(vec![
            dangling.clone(),
            Condition::simple("age", CompareOp::GreaterThan, Some(json!(10))),
        ]);
        assert!(!eval(&and, &ctx));

        let or = Condition::any(vec![
            dangling,
            Condition::simple("age", CompareOp::GreaterThan, Some(json!(10))),
        ]);
        assert!(eval(&or, &ctx));
    }

    #[test]
    fn test_contains_string_and_array() {
        let ctx = make_ctx(vec![("s-notes", json!("gluten free meal"))]);
        let cond = Condition::simple("s-notes", CompareOp::Contains, Some(json!("gluten")));
        assert!(eval(&cond, &ctx));

        let ctx = make_ctx(vec![("s-tags", json!(["vip", "speaker"]))]);
        let cond = Condition::simple("tags", CompareOp::Contains, Some(json!("vip")));
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("tags", CompareOp::NotContains, Some(json!("press")));
        assert!(eval(&cond, &ctx));
    }

    #[test]
    fn test_in_and_not_in() {
        let ctx = make_ctx(vec![("s-attendance", json!("maybe"))]);
        let cond = Condition::simple(
            "attendance",
            CompareOp::In,
            Some(json!(["yes", "maybe"])),
        );
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("attendance", CompareOp::NotIn, Some(json!(["yes", "no"])));
        assert!(eval(&cond, &ctx));
        // Malformed right-hand side fails closed.
        let cond = Condition::simple("attendance", CompareOp::NotIn, Some(json!("yes")));
        assert!(!eval(&cond, &ctx));
    }

    #[test]
    fn test_matches() {
        let ctx = make_ctx(vec![("s-dietary", json!("vegan-strict"))]);
        let cond = Condition::simple("dietary", CompareOp::Matches, Some(json!("^vegan")));
        assert!(eval(&cond, &ctx));
        let cond = Condition::simple("dietary", CompareOp::Matches, Some(json!("^halal")));
        assert!(!eval(&cond, &ctx));
        // Invalid pattern is a no-match, not a panic.
        let cond = Condition::simple("dietary", CompareOp::Matches, Some(json!("[unclosed")));
        assert!(!eval(&cond, &ctx));
    }

    #[test]
    fn test_compound_empty_sets() {
        let ctx = make_ctx(vec![]);
        assert!(eval(&Condition::all(vec![]), &ctx));
        assert!(!eval(&Condition::any(vec![]), &ctx));
    }

    #[test]
    fn test_nested_compound() {
        let ctx = make_ctx(vec![
            ("s-age", json!(20)),
            ("s-attendance", json!("yes")),
        ]);
        let cond = Condition::all(vec![
            Condition::simple("attendance", CompareOp::Equals, Some(json!("yes"))),
            Condition::any(vec![
                Condition::simple("age", CompareOp::GreaterOrEqual, Some(json!(18))),
                Condition::simple("dietary", CompareOp::IsNotEmpty, None),
            ]),
        ]);
        assert!(eval(&cond, &ctx));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("x")));
    }
}
