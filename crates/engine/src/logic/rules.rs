//! Logic rule application: effective requiredness and visibility.
//!
//! Rules are evaluated in ascending position, but the final state is
//! re-derived from the full set of fired actions rather than folded
//! incrementally: every true `require` is applied first, every true `hide`
//! afterwards, so a hide wins for a target no matter where it sits in the
//! rule order. Broken rules degrade to warnings, never errors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::logic::evaluator::ConditionEvaluator;
use crate::run::context::EvalContext;
use crate::workflow::types::{RuleAction, RuleTarget, TargetKind, Workflow};

/// A rule that could not be applied cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleWarning {
    /// Offending rule.
    pub rule_id: String,

    /// What was wrong.
    pub detail: String,
}

/// Result of requiredness derivation.
#[derive(Debug, Clone)]
pub struct RequiredOutcome {
    /// Step ids that must hold a value for the run to complete.
    pub required: BTreeSet<String>,

    /// Rules skipped or flagged during evaluation.
    pub warnings: Vec<RuleWarning>,
}

/// Result of visibility derivation.
#[derive(Debug, Clone)]
pub struct VisibilityOutcome {
    /// Visibility per step and section id.
    pub visible: BTreeMap<String, bool>,

    /// Rules skipped or flagged during evaluation.
    pub warnings: Vec<RuleWarning>,
}

/// Applies a workflow's logic rules to a run context.
pub struct RuleEngine {
    evaluator: ConditionEvaluator,
}

impl RuleEngine {
    /// Create a new rule engine.
    pub fn new() -> Self {
        Self {
            evaluator: ConditionEvaluator::new(),
        }
    }

    /// Derive the set of effectively-required step ids.
    ///
    /// Seeds from static `required` flags; true `require` rules add their
    /// target (a section target adds every step it owns), true `hide`
    /// rules remove theirs. `show` rules do not touch requiredness.
    pub fn effective_required(&self, workflow: &Workflow, ctx: &EvalContext) -> RequiredOutcome {
        let (fired, warnings) = self.fired_actions(workflow, ctx);

        let mut required = workflow.initial_required();

        for action in &fired {
            if let RuleAction::Require { target } = action {
                for id in target_step_ids(workflow, target) {
                    required.insert(id);
                }
            }
        }
        // Hides last: a true hide dominates any true require for the same
        // target regardless of rule order.
        for action in &fired {
            if let RuleAction::Hide { target } = action {
                for id in target_step_ids(workflow, target) {
                    required.remove(&id);
                }
            }
        }

        RequiredOutcome { required, warnings }
    }

    /// Derive visibility for every step and section.
    ///
    /// Targets carrying at least one `show` rule default hidden and appear
    /// when any of their show conditions holds; everything else defaults
    /// visible. A true `hide` forces the target hidden either way, and a
    /// hidden section hides every step it owns.
    pub fn visibility(&self, workflow: &Workflow, ctx: &EvalContext) -> VisibilityOutcome {
        let (fired, warnings) = self.fired_actions(workflow, ctx);

        let show_targets: HashSet<&str> = workflow
            .rules
            .iter()
            .filter_map(|r| match &r.action {
                RuleAction::Show { target } => Some(target.id.as_str()),
                _ => None,
            })
            .collect();

        let mut shown: HashSet<&str> = HashSet::new();
        let mut hidden: HashSet<&str> = HashSet::new();
        for action in &fired {
            match action {
                RuleAction::Show { target } => {
                    shown.insert(target.id.as_str());
                }
                RuleAction::Hide { target } => {
                    hidden.insert(target.id.as_str());
                }
                RuleAction::Require { .. } => {}
            }
        }

        let resolve = |id: &str| -> bool {
            if hidden.contains(id) {
                return false;
            }
            if show_targets.contains(id) {
                return shown.contains(id);
            }
            true
        };

        let mut visible = BTreeMap::new();
        for section in &workflow.sections {
            let section_visible = resolve(&section.id);
            visible.insert(section.id.clone(), section_visible);
            for step in &section.steps {
                let step_visible = section_visible && resolve(&step.id);
                visible.insert(step.id.clone(), step_visible);
            }
        }

        VisibilityOutcome { visible, warnings }
    }

    /// Evaluate every rule in order; return the actions whose conditions
    /// hold plus warnings for rules that could not be applied cleanly.
    fn fired_actions<'a>(
        &self,
        workflow: &'a Workflow,
        ctx: &EvalContext,
    ) -> (Vec<&'a RuleAction>, Vec<RuleWarning>) {
        let mut fired = Vec::new();
        let mut warnings = Vec::new();

        for rule in workflow.ordered_rules() {
            // Dangling operand references are flagged but still evaluated:
            // the evaluator treats them as absent, so the rule fails closed.
            for var in rule.condition.referenced_variables() {
                if !ctx.vars().contains(var) {
                    tracing::warn!(rule_id = %rule.id, variable = %var, "rule condition references unknown variable");
                    warnings.push(RuleWarning {
                        rule_id: rule.id.clone(),
                        detail: format!("condition references unknown variable '{}'", var),
                    });
                }
            }

            let target = rule.action.target();
            if !target_exists(workflow, target) {
                tracing::warn!(rule_id = %rule.id, target = %target.id, "rule target no longer exists, skipping");
                warnings.push(RuleWarning {
                    rule_id: rule.id.clone(),
                    detail: format!("target {} '{}' does not exist", target.kind, target.id),
                });
                continue;
            }

            if self.evaluator.evaluate(&rule.condition, ctx) {
                tracing::debug!(rule_id = %rule.id, action = rule.action.verb(), target = %target.id, "rule fired");
                fired.push(&rule.action);
            }
        }

        (fired, warnings)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn target_exists(workflow: &Workflow, target: &RuleTarget) -> bool {
    match target.kind {
        TargetKind::Step => workflow.step(&target.id).is_some(),
        TargetKind::Section => workflow.section(&target.id).is_some(),
    }
}

/// Step ids a target expands to: itself for a step, every owned step for
/// a section.
fn target_step_ids(workflow: &Workflow, target: &RuleTarget) -> Vec<String> {
    match target.kind {
        TargetKind::Step => vec![target.id.clone()],
        TargetKind::Section => workflow
            .section(&target.id)
            .map(|sec| sec.steps.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default(),
    }
}
