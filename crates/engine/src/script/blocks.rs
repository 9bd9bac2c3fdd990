//! Transform-block execution.
//!
//! Blocks for a phase run strictly sequentially in position order, each
//! against the data map as earlier blocks left it. A block sees only its
//! whitelisted input keys and produces exactly one output key. A failing
//! or timed-out block is recorded and skipped; siblings still run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::script::runner::ScriptRunner;
use crate::vars::VariableTable;
use crate::workflow::types::{Phase, TransformBlock, Workflow};

/// One block that did not produce its output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockFailure {
    /// Failing block.
    pub block_id: String,

    /// Phase it ran in.
    pub phase: Phase,

    /// What went wrong.
    pub message: String,
}

/// Result of running all blocks for one phase.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    /// Input data plus every successful block output (and virtual-step
    /// mirrors).
    pub data: HashMap<String, serde_json::Value>,

    /// Failures in execution order.
    pub failures: Vec<BlockFailure>,
}

/// Runs a workflow's transform blocks for a lifecycle phase.
#[derive(Debug, Clone)]
pub struct TransformBlockRunner {
    runner: ScriptRunner,
    config: EngineConfig,
}

impl TransformBlockRunner {
    /// Create a runner with the given engine limits.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            runner: ScriptRunner::new(config.script_max_operations),
            config,
        }
    }

    /// Execute every enabled block of the phase, in ascending position.
    ///
    /// For `on_section_complete`, `section_id` narrows execution to blocks
    /// owned by that section; it is ignored for the workflow phase.
    pub fn run_phase(
        &self,
        workflow: &Workflow,
        phase: Phase,
        section_id: Option<&str>,
        data: &HashMap<String, serde_json::Value>,
    ) -> PhaseReport {
        let vars = VariableTable::from_workflow(workflow);
        let mut working = data.clone();
        let mut failures = Vec::new();

        let mut blocks: Vec<&TransformBlock> = workflow
            .transform_blocks
            .iter()
            .filter(|b| b.enabled && b.phase == phase)
            .filter(|b| match phase {
                Phase::OnWorkflowComplete => true,
                Phase::OnSectionComplete => b.section_id.as_deref() == section_id,
            })
            .collect();
        blocks.sort_by_key(|b| b.position);

        for block in blocks {
            let inputs = self.collect_inputs(block, &vars, &working);
            let budget = self.config.block_timeout(block.timeout_ms);

            match self.runner.eval(&block.script, &inputs, budget) {
                Ok(value) => {
                    tracing::debug!(block_id = %block.id, output_key = %block.output_key, "transform block produced output");
                    if let Some(virtual_step) = &block.virtual_step_id {
                        working.insert(virtual_step.clone(), value.clone());
                    }
                    working.insert(block.output_key.clone(), value);
                }
                Err(err) => {
                    tracing::warn!(block_id = %block.id, phase = %phase, error = %err, "transform block failed");
                    failures.push(BlockFailure {
                        block_id: block.id.clone(),
                        phase,
                        message: err.to_string(),
                    });
                }
            }
        }

        PhaseReport {
            data: working,
            failures,
        }
    }

    /// Build the script scope: exactly the declared input keys, each
    /// resolved alias-first against the data map, absent values as null.
    fn collect_inputs(
        &self,
        block: &TransformBlock,
        vars: &VariableTable,
        data: &HashMap<String, serde_json::Value>,
    ) -> HashMap<String, serde_json::Value> {
        let mut inputs = HashMap::new();
        for key in &block.input_keys {
            let resolved = vars.resolve(key).unwrap_or(key);
            let value = data
                .get(resolved)
                .or_else(|| data.get(key.as_str()))
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            inputs.insert(key.clone(), value);
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_workflow(blocks: Vec<TransformBlock>) -> Workflow {
        let yaml = r#"
id: 7f3e9b21-4c8d-4e5a-b1f6-0d2a8c4e6f91
name: Blocks test
tenant_id: t-1
sections:
  - id: sec-ticket
    steps:
      - id: s-ticket-type
        kind: choice
        alias: ticket_type
      - id: s-qty
        kind: number
        alias: quantity
      - id: s-price
        kind: computed
        alias: price
        is_virtual: true
"#;
        let mut wf: Workflow = serde_yaml::from_str(yaml).unwrap();
        wf.transform_blocks = blocks;
        wf
    }

    fn make_block(id: &str, position: u32, script: &str, inputs: Vec<&str>, output: &str) -> TransformBlock {
        TransformBlock {
            id: id.to_string(),
            name: id.to_string(),
            section_id: None,
            script: script.to_string(),
            input_keys: inputs.into_iter().map(String::from).collect(),
            output_key: output.to_string(),
            phase: Phase::OnWorkflowComplete,
            enabled: true,
            position,
            timeout_ms: None,
            virtual_step_id: None,
        }
    }

    fn runner() -> TransformBlockRunner {
        TransformBlockRunner::new(EngineConfig::default())
    }

    fn data(pairs: Vec<(&str, serde_json::Value)>) -> HashMap<String, serde_json::Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_price_derivation() {
        let mut block = make_block(
            "b-price",
            0,
            r#"if ticket_type == "vip" { 299 } else { 99 }"#,
            vec!["ticket_type"],
            "price",
        );
        block.virtual_step_id = Some("s-price".to_string());
        let wf = make_workflow(vec![block]);

        let report = runner().run_phase(
            &wf,
            Phase::OnWorkflowComplete,
            None,
            &data(vec![("s-ticket-type", json!("vip"))]),
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.data.get("price"), Some(&json!(299)));
        // Mirrored onto the bound virtual step.
        assert_eq!(report.data.get("s-price"), Some(&json!(299)));
    }

    #[test]
    fn test_blocks_chain_in_position_order() {
        let wf = make_workflow(vec![
            make_block("b-total", 1, "subtotal * 2", vec!["subtotal"], "total"),
            make_block("b-subtotal", 0, "quantity * 10", vec!["quantity"], "subtotal"),
        ]);

        let report = runner().run_phase(
            &wf,
            Phase::OnWorkflowComplete,
            None,
            &data(vec![("s-qty", json!(3))]),
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.data.get("subtotal"), Some(&json!(30)));
        assert_eq!(report.data.get("total"), Some(&json!(60)));
    }

    #[test]
    fn test_failure_does_not_abort_siblings() {
        let wf = make_workflow(vec![
            make_block("b-bad", 0, "no_such_fn()", vec![], "broken"),
            make_block("b-ok", 1, "quantity + 1", vec!["quantity"], "next_qty"),
        ]);

        let report = runner().run_phase(
            &wf,
            Phase::OnWorkflowComplete,
            None,
            &data(vec![("s-qty", json!(7))]),
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].block_id, "b-bad");
        assert!(report.data.get("broken").is_none());
        assert_eq!(report.data.get("next_qty"), Some(&json!(8)));
    }

    #[test]
    fn test_timeout_is_isolated_per_block() {
        let mut slow = make_block("b-slow", 0, "loop { }", vec![], "never");
        slow.timeout_ms = Some(50);
        let wf = make_workflow(vec![
            slow,
            make_block("b-fast", 1, "2 + 2", vec![], "four"),
        ]);

        // Unbounded op cap so the wall-clock deadline is the only binding
        // limit; with the default cap the two bounds race on fast machines.
        let r = TransformBlockRunner::new(EngineConfig {
            script_max_operations: u64::MAX,
            ..EngineConfig::default()
        });
        let report = r.run_phase(&wf, Phase::OnWorkflowComplete, None, &data(vec![]));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].block_id, "b-slow");
        assert!(report.failures[0].message.contains("timed out"));
        assert!(report.data.get("never").is_none());
        assert_eq!(report.data.get("four"), Some(&json!(4)));
    }

    #[test]
    fn test_disabled_block_skipped() {
        let mut block = make_block("b-off", 0, "1", vec![], "one");
        block.enabled = false;
        let wf = make_workflow(vec![block]);

        let report = runner().run_phase(&wf, Phase::OnWorkflowComplete, None, &data(vec![]));
        assert!(report.failures.is_empty());
        assert!(report.data.get("one").is_none());
    }

    #[test]
    fn test_undeclared_state_is_invisible() {
        // quantity exists in the data map but is not whitelisted.
        let wf = make_workflow(vec![make_block(
            "b-nosy",
            0,
            "quantity * 2",
            vec![],
            "doubled",
        )]);

        let report = runner().run_phase(
            &wf,
            Phase::OnWorkflowComplete,
            None,
            &data(vec![("s-qty", json!(3))]),
        );
        assert_eq!(report.failures.len(), 1);
        assert!(report.data.get("doubled").is_none());
    }

    #[test]
    fn test_missing_input_is_null() {
        let wf = make_workflow(vec![make_block(
            "b-check",
            0,
            "if quantity == () { -1 } else { quantity }",
            vec!["quantity"],
            "checked",
        )]);

        let report = runner().run_phase(&wf, Phase::OnWorkflowComplete, None, &data(vec![]));
        assert!(report.failures.is_empty());
        assert_eq!(report.data.get("checked"), Some(&json!(-1)));
    }

    #[test]
    fn test_section_phase_filtering() {
        let mut section_block = make_block("b-section", 0, "1", vec![], "sec_out");
        section_block.phase = Phase::OnSectionComplete;
        section_block.section_id = Some("sec-ticket".to_string());
        let mut other_section = make_block("b-other", 1, "2", vec![], "other_out");
        other_section.phase = Phase::OnSectionComplete;
        other_section.section_id = Some("sec-elsewhere".to_string());
        let workflow_block = make_block("b-wf", 0, "3", vec![], "wf_out");

        let wf = make_workflow(vec![section_block, other_section, workflow_block]);
        let r = runner();

        // Workflow phase runs only the workflow block.
        let report = r.run_phase(&wf, Phase::OnWorkflowComplete, None, &data(vec![]));
        assert_eq!(report.data.get("wf_out"), Some(&json!(3)));
        assert!(report.data.get("sec_out").is_none());

        // Section phase runs only blocks owned by that section.
        let report = r.run_phase(
            &wf,
            Phase::OnSectionComplete,
            Some("sec-ticket"),
            &data(vec![]),
        );
        assert_eq!(report.data.get("sec_out"), Some(&json!(1)));
        assert!(report.data.get("other_out").is_none());
        assert!(report.data.get("wf_out").is_none());
    }

    #[test]
    fn test_alias_input_resolution() {
        let wf = make_workflow(vec![make_block(
            "b-alias",
            0,
            "ticket_type",
            vec!["ticket_type"],
            "echoed",
        )]);

        // Value stored under the canonical step id, declared by alias.
        let report = runner().run_phase(
            &wf,
            Phase::OnWorkflowComplete,
            None,
            &data(vec![("s-ticket-type", json!("standard"))]),
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.data.get("echoed"), Some(&json!("standard")));
    }
}
