//! Sandboxed script evaluation using rhai.
//!
//! Every evaluation gets a fresh interpreter with a wall-clock deadline,
//! an operation cap and hard size limits. The only state a script can see
//! is the scope pushed for it; there is no I/O, no module resolution and
//! nothing survives between evaluations.

use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Failure of a single script evaluation.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Wall-clock budget exhausted.
    #[error("script timed out after {0}ms")]
    Timeout(u64),

    /// Script raised or misbehaved.
    #[error("script failed: {0}")]
    Runtime(String),

    /// Input or output could not cross the interpreter boundary.
    #[error("script value conversion failed: {0}")]
    Convert(String),
}

impl From<ScriptError> for EngineError {
    fn from(err: ScriptError) -> Self {
        EngineError::Script(err.to_string())
    }
}

/// Evaluates user-authored scripts in an embedded interpreter.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    max_operations: u64,
}

impl ScriptRunner {
    /// Create a runner with the given operation cap.
    pub fn new(max_operations: u64) -> Self {
        Self { max_operations }
    }

    /// Evaluate a script against exactly the given inputs.
    ///
    /// Each input becomes a scope variable under its declared name; the
    /// result is the script's final expression value, with unit mapped to
    /// JSON null.
    pub fn eval(
        &self,
        source: &str,
        inputs: &HashMap<String, serde_json::Value>,
        budget: std::time::Duration,
    ) -> Result<serde_json::Value, ScriptError> {
        let mut engine = rhai::Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);

        let deadline = Instant::now() + budget;
        engine.on_progress(move |_| {
            if Instant::now() >= deadline {
                Some(rhai::Dynamic::from("deadline"))
            } else {
                None
            }
        });

        let mut scope = rhai::Scope::new();
        for (name, value) in inputs {
            let dynamic =
                rhai::serde::to_dynamic(value).map_err(|e| ScriptError::Convert(e.to_string()))?;
            scope.push_dynamic(name.clone(), dynamic);
        }

        match engine.eval_with_scope::<rhai::Dynamic>(&mut scope, source) {
            Ok(result) => dynamic_to_json(result),
            Err(err) => Err(classify_error(*err, budget)),
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(EngineConfig::default().script_max_operations)
    }
}

fn classify_error(err: rhai::EvalAltResult, budget: std::time::Duration) -> ScriptError {
    match err {
        rhai::EvalAltResult::ErrorTerminated(_, _) => {
            ScriptError::Timeout(budget.as_millis() as u64)
        }
        rhai::EvalAltResult::ErrorTooManyOperations(_) => {
            ScriptError::Runtime("operation limit exceeded".to_string())
        }
        other => ScriptError::Runtime(other.to_string()),
    }
}

fn dynamic_to_json(value: rhai::Dynamic) -> Result<serde_json::Value, ScriptError> {
    if value.is_unit() {
        return Ok(serde_json::Value::Null);
    }
    rhai::serde::from_dynamic(&value).map_err(|e| ScriptError::Convert(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn inputs(pairs: Vec<(&str, serde_json::Value)>) -> HashMap<String, serde_json::Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn budget() -> Duration {
        Duration::from_millis(500)
    }

    #[test]
    fn test_arithmetic_over_inputs() {
        let runner = ScriptRunner::default();
        let result = runner
            .eval(
                "price * quantity",
                &inputs(vec![("price", json!(10)), ("quantity", json!(3))]),
                budget(),
            )
            .unwrap();
        assert_eq!(result, json!(30));
    }

    #[test]
    fn test_conditional_expression() {
        let runner = ScriptRunner::default();
        let script = r#"if ticket_type == "vip" { 299 } else { 99 }"#;
        let result = runner
            .eval(
                script,
                &inputs(vec![("ticket_type", json!("vip"))]),
                budget(),
            )
            .unwrap();
        assert_eq!(result, json!(299));

        let result = runner
            .eval(
                script,
                &inputs(vec![("ticket_type", json!("standard"))]),
                budget(),
            )
            .unwrap();
        assert_eq!(result, json!(99));
    }

    #[test]
    fn test_nested_input_access() {
        let runner = ScriptRunner::default();
        let result = runner
            .eval(
                "company.seats * 2",
                &inputs(vec![("company", json!({"name": "Acme", "seats": 12}))]),
                budget(),
            )
            .unwrap();
        assert_eq!(result, json!(24));
    }

    #[test]
    fn test_map_output() {
        let runner = ScriptRunner::default();
        let result = runner
            .eval(
                r#"#{ total: count + 1, tags: ["a", "b"] }"#,
                &inputs(vec![("count", json!(4))]),
                budget(),
            )
            .unwrap();
        assert_eq!(result, json!({"total": 5, "tags": ["a", "b"]}));
    }

    #[test]
    fn test_unit_result_is_null() {
        let runner = ScriptRunner::default();
        let result = runner.eval("let x = 1;", &inputs(vec![]), budget()).unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[test]
    fn test_undeclared_input_is_invisible() {
        let runner = ScriptRunner::default();
        let err = runner
            .eval("secret_key", &inputs(vec![("visible", json!(1))]), budget())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_infinite_loop_times_out() {
        // Unbounded op cap so the wall-clock deadline is the only binding
        // limit; with the default cap the two bounds race on fast machines.
        let runner = ScriptRunner::new(u64::MAX);
        let started = Instant::now();
        let err = runner
            .eval("loop { }", &inputs(vec![]), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout(50)));
        // The deadline fires close to the budget, not at the op cap.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_operation_cap() {
        let runner = ScriptRunner::new(100);
        let err = runner
            .eval(
                "let n = 0; while n < 1000000 { n += 1 }; n",
                &inputs(vec![]),
                Duration::from_secs(10),
            )
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_runtime_error_classified() {
        let runner = ScriptRunner::default();
        let err = runner
            .eval("no_such_function()", &inputs(vec![]), budget())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }
}
