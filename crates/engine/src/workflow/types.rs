//! Workflow definition types.
//!
//! Complete type definitions for formloom workflows:
//! - sections own ordered steps; steps carry alias/required/virtual flags
//! - logic rules pair a condition tree with a show/hide/require action
//! - transform blocks are phase-scoped scripts with whitelisted inputs
//! - runs and step values are the append-only answer record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::logic::condition::Condition;

/// Supported step kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ShortText,
    LongText,
    Number,
    Boolean,
    Choice,
    MultiChoice,
    Date,
    Computed,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepKind::ShortText => "short_text",
            StepKind::LongText => "long_text",
            StepKind::Number => "number",
            StepKind::Boolean => "boolean",
            StepKind::Choice => "choice",
            StepKind::MultiChoice => "multi_choice",
            StepKind::Date => "date",
            StepKind::Computed => "computed",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Steps and Sections
// ============================================================================

/// A single data point collected (or derived) by a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step id (unique within the workflow).
    pub id: String,

    /// Step kind.
    pub kind: StepKind,

    /// Human-readable variable name for rules, scripts and templates.
    #[serde(default)]
    pub alias: Option<String>,

    /// Prompt shown to the respondent. Virtual steps have none.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Statically required: must hold a value for the run to complete.
    #[serde(default)]
    pub required: bool,

    /// Virtual steps surface computed values and are never asked.
    #[serde(default)]
    pub is_virtual: bool,

    /// Position within the owning section.
    #[serde(default)]
    pub position: u32,

    /// Choice options (choice/multi_choice kinds).
    #[serde(default)]
    pub options: Option<Vec<String>>,

    /// Additional builder-defined properties.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Ordered grouping of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Section id (unique within the workflow).
    pub id: String,

    /// Section title.
    #[serde(default)]
    pub title: String,

    /// Position within the workflow.
    #[serde(default)]
    pub position: u32,

    /// Steps owned by this section, in display order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

// ============================================================================
// Logic Rules
// ============================================================================

/// What a rule acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Step,
    Section,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetKind::Step => "step",
            TargetKind::Section => "section",
        };
        write!(f, "{}", s)
    }
}

/// Target of a rule action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTarget {
    /// Step or section id.
    pub id: String,

    /// Target kind.
    pub kind: TargetKind,
}

/// Rule action, tagged by effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Reveal a default-hidden target when the condition holds.
    Show { target: RuleTarget },

    /// Hide the target (and drop its requiredness) when the condition holds.
    Hide { target: RuleTarget },

    /// Make the target mandatory when the condition holds.
    Require { target: RuleTarget },
}

impl RuleAction {
    /// The target this action applies to.
    pub fn target(&self) -> &RuleTarget {
        match self {
            RuleAction::Show { target } => target,
            RuleAction::Hide { target } => target,
            RuleAction::Require { target } => target,
        }
    }

    /// Effect name for logging.
    pub fn verb(&self) -> &'static str {
        match self {
            RuleAction::Show { .. } => "show",
            RuleAction::Hide { .. } => "hide",
            RuleAction::Require { .. } => "require",
        }
    }
}

/// Conditional visibility/requirement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicRule {
    /// Rule id (unique within the workflow).
    pub id: String,

    /// Evaluation order (ascending).
    #[serde(default)]
    pub position: u32,

    /// Condition tree evaluated against current answers.
    pub condition: Condition,

    /// Action applied when the condition holds.
    pub action: RuleAction,
}

// ============================================================================
// Transform Blocks
// ============================================================================

/// Lifecycle phase a transform block runs at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// After all answers are in, before completion validation.
    #[default]
    OnWorkflowComplete,

    /// After a single section's answers are in.
    OnSectionComplete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::OnWorkflowComplete => "on_workflow_complete",
            Phase::OnSectionComplete => "on_section_complete",
        };
        write!(f, "{}", s)
    }
}

/// User-authored derivation script bound to a lifecycle phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformBlock {
    /// Block id (unique within the workflow).
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Owning section for `on_section_complete` blocks.
    #[serde(default)]
    pub section_id: Option<String>,

    /// Script source.
    pub script: String,

    /// Whitelisted inputs (aliases or step ids); nothing else is visible
    /// to the script.
    #[serde(default)]
    pub input_keys: Vec<String>,

    /// Key the result is stored under.
    pub output_key: String,

    /// Lifecycle phase.
    #[serde(default)]
    pub phase: Phase,

    /// Disabled blocks are skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Execution order within the phase (ascending).
    #[serde(default)]
    pub position: u32,

    /// Per-block time budget override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Virtual step the output is mirrored to, when bound.
    #[serde(default)]
    pub virtual_step_id: Option<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Workflow Definition
// ============================================================================

/// Complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow id.
    pub id: Uuid,

    /// Workflow name.
    pub name: String,

    /// Owning tenant.
    pub tenant_id: String,

    /// Owning project, when the workflow belongs to one.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Sections in display order.
    #[serde(default)]
    pub sections: Vec<Section>,

    /// Logic rules.
    #[serde(default)]
    pub rules: Vec<LogicRule>,

    /// Transform blocks.
    #[serde(default)]
    pub transform_blocks: Vec<TransformBlock>,
}

impl Workflow {
    /// Iterate all steps across all sections.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.sections.iter().flat_map(|s| s.steps.iter())
    }

    /// Get a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps().find(|s| s.id == id)
    }

    /// Get a step by alias.
    pub fn step_by_alias(&self, alias: &str) -> Option<&Step> {
        self.steps().find(|s| s.alias.as_deref() == Some(alias))
    }

    /// Get a section by id.
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Get the section owning a step.
    pub fn section_of(&self, step_id: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|sec| sec.steps.iter().any(|s| s.id == step_id))
    }

    /// Step ids flagged statically required.
    pub fn initial_required(&self) -> BTreeSet<String> {
        self.steps()
            .filter(|s| s.required)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Rules in evaluation order (ascending position, stable).
    pub fn ordered_rules(&self) -> Vec<&LogicRule> {
        let mut rules: Vec<&LogicRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.position);
        rules
    }
}

// ============================================================================
// Runs and Step Values
// ============================================================================

/// Execution instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run id.
    pub id: Uuid,

    /// Workflow this run belongs to.
    pub workflow_id: Uuid,

    /// Completed runs accept no further value writes.
    #[serde(default)]
    pub completed: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Completion timestamp, once completed.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a fresh, incomplete run.
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Collected answer for one step of one run. Unique per (run, step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepValue {
    /// Owning run.
    pub run_id: Uuid,

    /// Step the value belongs to.
    pub step_id: String,

    /// The answer payload.
    pub value: serde_json::Value,

    /// Last write timestamp.
    pub updated_at: DateTime<Utc>,
}

impl StepValue {
    /// Create a step value stamped now.
    pub fn new(run_id: Uuid, step_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            run_id,
            step_id: step_id.into(),
            value,
            updated_at: Utc::now(),
        }
    }
}
