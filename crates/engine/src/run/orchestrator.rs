//! Run completion orchestration.
//!
//! Composes the transform runner, rule engine and store into the one
//! completion pass:
//! - load the run snapshot
//! - run `on_workflow_complete` transform blocks over the answers
//! - derive effective requiredness against the merged data
//! - validate completeness, then persist atomically
//!
//! A failed attempt never partially completes a run; re-attempting after
//! fixing missing values replays the whole pass from a fresh snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, MissingStep};
use crate::logic::evaluator::is_empty_value;
use crate::logic::rules::{RuleEngine, RuleWarning, VisibilityOutcome};
use crate::run::context::EvalContext;
use crate::script::blocks::{BlockFailure, PhaseReport, TransformBlockRunner};
use crate::store::RunStore;
use crate::workflow::types::{Phase, StepValue, Workflow, WorkflowRun};

/// Outcome of a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletion {
    /// The run, now completed.
    pub run: WorkflowRun,

    /// Step values produced by transform blocks during this pass.
    pub derived: Vec<StepValue>,

    /// Blocks that failed (completion proceeded without their output).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub block_failures: Vec<BlockFailure>,

    /// Rules that could not be applied cleanly.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rule_warnings: Vec<RuleWarning>,
}

/// Outcome of a section-complete derivation pass.
///
/// Persistence of the derived values is the caller's business; the run is
/// still in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDerivation {
    /// Step values produced by the section's transform blocks.
    pub derived: Vec<StepValue>,

    /// Blocks that failed.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub block_failures: Vec<BlockFailure>,
}

/// Drives workflow runs to completion.
///
/// Holds no per-run state: every call loads its own snapshot, so
/// concurrent completions of different runs never interfere.
pub struct RunOrchestrator<S: RunStore> {
    store: Arc<S>,
    rules: RuleEngine,
    blocks: TransformBlockRunner,
}

impl<S: RunStore + 'static> RunOrchestrator<S> {
    /// Create an orchestrator over a store.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            rules: RuleEngine::new(),
            blocks: TransformBlockRunner::new(config),
        }
    }

    /// Complete a run on behalf of a user.
    ///
    /// Fails with [`EngineError::MissingValues`] when any effectively
    /// required step has no usable value; the run then stays in progress
    /// with every submitted value preserved.
    pub async fn complete_run(&self, run_id: Uuid, user_id: &str) -> EngineResult<RunCompletion> {
        let snapshot = self.store.load_run_context(run_id).await?;
        if snapshot.run.completed {
            return Err(EngineError::AlreadyCompleted(run_id));
        }

        let answers = value_map(&snapshot.values);
        let report = self
            .run_blocks(
                snapshot.workflow.clone(),
                Phase::OnWorkflowComplete,
                None,
                answers.clone(),
            )
            .await?;

        let ctx = EvalContext::for_run(
            &snapshot.workflow,
            &snapshot.run,
            report.data.clone(),
            Phase::OnWorkflowComplete,
        );
        let outcome = self.rules.effective_required(&snapshot.workflow, &ctx);

        let mut missing = Vec::new();
        for step_id in &outcome.required {
            let has_value = report
                .data
                .get(step_id)
                .map(|v| !is_empty_value(v))
                .unwrap_or(false);
            if !has_value {
                missing.push(MissingStep {
                    step_id: step_id.clone(),
                    alias: ctx.vars().alias_of(step_id).map(str::to_string),
                });
            }
        }
        if !missing.is_empty() {
            warn!(
                run_id = %run_id,
                user_id = %user_id,
                missing = missing.len(),
                "run completion rejected, required steps unanswered"
            );
            return Err(EngineError::MissingValues { missing });
        }

        let derived = derived_values(run_id, &snapshot.workflow, &answers, &report.data);
        let run = self.store.mark_run_complete(run_id, &derived).await?;

        info!(
            run_id = %run_id,
            user_id = %user_id,
            derived = derived.len(),
            block_failures = report.failures.len(),
            "run completed"
        );

        Ok(RunCompletion {
            run,
            derived,
            block_failures: report.failures,
            rule_warnings: outcome.warnings,
        })
    }

    /// Run a section's `on_section_complete` transform blocks and return
    /// the resulting derivations without touching run state.
    pub async fn complete_section(
        &self,
        run_id: Uuid,
        section_id: &str,
    ) -> EngineResult<SectionDerivation> {
        let snapshot = self.store.load_run_context(run_id).await?;
        if snapshot.run.completed {
            return Err(EngineError::AlreadyCompleted(run_id));
        }
        if snapshot.workflow.section(section_id).is_none() {
            return Err(EngineError::Validation(format!(
                "section '{}' does not exist",
                section_id
            )));
        }

        let answers = value_map(&snapshot.values);
        let report = self
            .run_blocks(
                snapshot.workflow.clone(),
                Phase::OnSectionComplete,
                Some(section_id.to_string()),
                answers.clone(),
            )
            .await?;

        let derived = derived_values(run_id, &snapshot.workflow, &answers, &report.data);
        Ok(SectionDerivation {
            derived,
            block_failures: report.failures,
        })
    }

    /// Current step/section visibility for a run, derived from its answers
    /// as stored (no transform pass).
    pub async fn visibility(&self, run_id: Uuid) -> EngineResult<VisibilityOutcome> {
        let snapshot = self.store.load_run_context(run_id).await?;
        let ctx = EvalContext::for_run(
            &snapshot.workflow,
            &snapshot.run,
            value_map(&snapshot.values),
            Phase::OnWorkflowComplete,
        );
        Ok(self.rules.visibility(&snapshot.workflow, &ctx))
    }

    /// Scripts are sync; run the whole phase on a blocking task.
    async fn run_blocks(
        &self,
        workflow: Workflow,
        phase: Phase,
        section_id: Option<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> EngineResult<PhaseReport> {
        let runner = self.blocks.clone();
        tokio::task::spawn_blocking(move || {
            runner.run_phase(&workflow, phase, section_id.as_deref(), &data)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("Task join error: {}", e)))
    }
}

/// Collapse stored step values into the answer map.
fn value_map(values: &[StepValue]) -> HashMap<String, serde_json::Value> {
    values
        .iter()
        .map(|v| (v.step_id.clone(), v.value.clone()))
        .collect()
}

/// Step-bound values the transform pass added or changed. Outputs not
/// bound to any step stay ephemeral.
fn derived_values(
    run_id: Uuid,
    workflow: &Workflow,
    before: &HashMap<String, serde_json::Value>,
    after: &HashMap<String, serde_json::Value>,
) -> Vec<StepValue> {
    let mut derived = Vec::new();
    for step in workflow.steps() {
        if let Some(value) = after.get(&step.id) {
            if before.get(&step.id) != Some(value) {
                derived.push(StepValue::new(run_id, &step.id, value.clone()));
            }
        }
    }
    derived
}
