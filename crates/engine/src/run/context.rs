//! Run-scoped evaluation context.

use std::collections::HashMap;
use uuid::Uuid;

use crate::vars::VariableTable;
use crate::workflow::types::{Phase, StepKind, Workflow, WorkflowRun};

/// Read-only view of one run's answers plus ambient metadata.
///
/// Built once per evaluation pass (after transform outputs are merged) and
/// handed to every rule evaluation and node execution. Never persisted.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Workflow the run belongs to.
    pub workflow_id: Uuid,

    /// The run being evaluated.
    pub run_id: Uuid,

    /// Owning tenant.
    pub tenant_id: String,

    /// Owning project, when assigned.
    pub project_id: Option<String>,

    /// Lifecycle phase of this pass.
    pub phase: Phase,

    /// Answer map keyed by canonical step id.
    pub values: HashMap<String, serde_json::Value>,

    vars: VariableTable,
    kinds: HashMap<String, StepKind>,
}

impl EvalContext {
    /// Build the context for one run over an answer map.
    pub fn for_run(
        workflow: &Workflow,
        run: &WorkflowRun,
        values: HashMap<String, serde_json::Value>,
        phase: Phase,
    ) -> Self {
        let kinds = workflow
            .steps()
            .map(|s| (s.id.clone(), s.kind))
            .collect();

        Self {
            workflow_id: workflow.id,
            run_id: run.id,
            tenant_id: workflow.tenant_id.clone(),
            project_id: workflow.project_id.clone(),
            phase,
            values,
            vars: VariableTable::from_workflow(workflow),
            kinds,
        }
    }

    /// Look up a value by alias or step id.
    pub fn value(&self, name: &str) -> Option<&serde_json::Value> {
        let key = self.vars.resolve(name)?;
        self.values.get(key)
    }

    /// Declared kind of the step a name resolves to.
    pub fn kind_of(&self, name: &str) -> Option<StepKind> {
        let key = self.vars.resolve(name)?;
        self.kinds.get(key).copied()
    }

    /// The variable table backing resolution.
    pub fn vars(&self) -> &VariableTable {
        &self.vars
    }

    /// Context map for template rendering: every value under its step id,
    /// aliased values additionally under their alias.
    pub fn template_context(&self) -> HashMap<String, serde_json::Value> {
        let mut ctx: HashMap<String, serde_json::Value> = self.values.clone();
        for (alias, step_id) in self.vars.aliases() {
            if let Some(v) = self.values.get(step_id) {
                ctx.insert(alias.to_string(), v.clone());
            }
        }
        ctx
    }
}
