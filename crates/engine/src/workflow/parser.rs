//! Workflow YAML parser.
//!
//! Parses YAML workflow definitions into [`Workflow`] structures and
//! validates referential integrity:
//! - unique section/step/rule/block ids and aliases
//! - aliases and output keys shaped as script identifiers
//! - rule conditions and targets referencing existing steps/sections
//! - transform blocks with resolvable inputs and valid bindings
//!
//! Validation is the save-time gate. Rule evaluation stays tolerant of
//! references that drift after saving; see the rule engine's warnings.

use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::vars::VariableTable;
use crate::workflow::types::{Phase, TargetKind, Workflow};

/// Parse a YAML string into a validated Workflow.
pub fn parse_workflow(yaml_content: &str) -> EngineResult<Workflow> {
    let workflow: Workflow = serde_yaml::from_str(yaml_content)?;
    validate_workflow(&workflow)?;
    Ok(workflow)
}

/// Validate a parsed workflow.
pub fn validate_workflow(workflow: &Workflow) -> EngineResult<()> {
    if workflow.name.trim().is_empty() {
        return Err(EngineError::Validation(
            "Workflow name must not be empty".to_string(),
        ));
    }

    // Check for duplicate section ids
    let mut seen_sections = HashSet::new();
    for section in &workflow.sections {
        if !seen_sections.insert(section.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate section id: {}",
                section.id
            )));
        }
    }

    // Check for duplicate step ids and aliases
    let mut seen_steps = HashSet::new();
    let mut seen_aliases = HashSet::new();
    for step in workflow.steps() {
        if step.id.trim().is_empty() {
            return Err(EngineError::Validation(
                "Step id must not be empty".to_string(),
            ));
        }
        if !seen_steps.insert(step.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate step id: {}",
                step.id
            )));
        }
        if let Some(alias) = &step.alias {
            if !is_valid_identifier(alias) {
                return Err(EngineError::Validation(format!(
                    "Step '{}': alias '{}' is not a valid identifier",
                    step.id, alias
                )));
            }
            if !seen_aliases.insert(alias.as_str()) {
                return Err(EngineError::Validation(format!(
                    "Duplicate alias: {}",
                    alias
                )));
            }
        }
    }

    // An alias equal to another step's id would shadow it in resolution
    for step in workflow.steps() {
        if let Some(alias) = &step.alias {
            if let Some(other) = workflow.step(alias) {
                if other.id != step.id {
                    return Err(EngineError::Validation(format!(
                        "Step '{}': alias '{}' collides with step id '{}'",
                        step.id, alias, other.id
                    )));
                }
            }
        }
    }

    let vars = VariableTable::from_workflow(workflow);

    // Validate logic rules
    let mut seen_rules = HashSet::new();
    for rule in &workflow.rules {
        if !seen_rules.insert(rule.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate rule id: {}",
                rule.id
            )));
        }

        for variable in rule.condition.referenced_variables() {
            if !vars.contains(variable) {
                return Err(EngineError::Validation(format!(
                    "Rule '{}': condition references unknown variable '{}'",
                    rule.id, variable
                )));
            }
        }

        let target = rule.action.target();
        let exists = match target.kind {
            TargetKind::Step => workflow.step(&target.id).is_some(),
            TargetKind::Section => workflow.section(&target.id).is_some(),
        };
        if !exists {
            return Err(EngineError::Validation(format!(
                "Rule '{}': references unknown {} '{}'",
                rule.id, target.kind, target.id
            )));
        }
    }

    // Validate transform blocks
    let mut seen_blocks = HashSet::new();
    for block in &workflow.transform_blocks {
        if !seen_blocks.insert(block.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "Duplicate transform block id: {}",
                block.id
            )));
        }

        if block.script.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "Block '{}': script must not be empty",
                block.id
            )));
        }

        if !is_valid_identifier(&block.output_key) {
            return Err(EngineError::Validation(format!(
                "Block '{}': output key '{}' is not a valid identifier",
                block.id, block.output_key
            )));
        }

        for key in &block.input_keys {
            if !is_valid_identifier(key) {
                return Err(EngineError::Validation(format!(
                    "Block '{}': input key '{}' is not a valid identifier",
                    block.id, key
                )));
            }
            // Inputs resolve against step variables or earlier block outputs
            let is_block_output = workflow
                .transform_blocks
                .iter()
                .any(|b| b.id != block.id && b.output_key == *key);
            if !vars.contains(key) && !is_block_output {
                return Err(EngineError::Validation(format!(
                    "Block '{}': input key '{}' does not resolve to any step or block output",
                    block.id, key
                )));
            }
        }

        if let Some(virtual_step) = &block.virtual_step_id {
            match workflow.step(virtual_step) {
                Some(step) if step.is_virtual => {}
                Some(_) => {
                    return Err(EngineError::Validation(format!(
                        "Block '{}': step '{}' is not virtual and cannot surface block output",
                        block.id, virtual_step
                    )));
                }
                None => {
                    return Err(EngineError::Validation(format!(
                        "Block '{}': references unknown virtual step '{}'",
                        block.id, virtual_step
                    )));
                }
            }
        }

        if block.phase == Phase::OnSectionComplete {
            match &block.section_id {
                Some(section_id) if workflow.section(section_id).is_some() => {}
                Some(section_id) => {
                    return Err(EngineError::Validation(format!(
                        "Block '{}': references unknown section '{}'",
                        block.id, section_id
                    )));
                }
                None => {
                    return Err(EngineError::Validation(format!(
                        "Block '{}': on_section_complete blocks must name a section",
                        block.id
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Identifier shape: leading letter or underscore, then letters, digits
/// or underscores. Aliases and output keys become script scope names, so
/// anything else would be unreferenceable.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
