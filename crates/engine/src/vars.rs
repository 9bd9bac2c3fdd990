//! Variable resolution: alias-first mapping of operand names to step ids.

use std::collections::HashMap;

use crate::workflow::types::Workflow;

/// Maps rule/script/template operand names to canonical step ids.
///
/// Resolution tries the alias table first and falls back to treating the
/// name as a direct step id, so both spellings address the same value.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    by_alias: HashMap<String, String>,
    alias_by_id: HashMap<String, Option<String>>,
}

impl VariableTable {
    /// Build the table from a workflow definition.
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut by_alias = HashMap::new();
        let mut alias_by_id = HashMap::new();

        for step in workflow.steps() {
            if let Some(alias) = &step.alias {
                by_alias.insert(alias.clone(), step.id.clone());
            }
            alias_by_id.insert(step.id.clone(), step.alias.clone());
        }

        Self {
            by_alias,
            alias_by_id,
        }
    }

    /// Resolve an operand name to a canonical step id.
    ///
    /// Alias match wins over a same-spelled step id. The returned id may
    /// borrow from `name` itself when the name is already canonical.
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some(id) = self.by_alias.get(name) {
            return Some(id.as_str());
        }
        if self.alias_by_id.contains_key(name) {
            return Some(name);
        }
        None
    }

    /// Whether the name resolves at all.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Alias registered for a step id, if any.
    pub fn alias_of(&self, step_id: &str) -> Option<&str> {
        self.alias_by_id.get(step_id)?.as_deref()
    }

    /// Iterate (alias, step id) pairs.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_alias.iter().map(|(a, id)| (a.as_str(), id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_workflow() -> Workflow {
        let yaml = r#"
id: 9d2b4c1e-33aa-4d47-9a51-5f2b3b8f4a10
name: Resolution test
tenant_id: t-1
sections:
  - id: sec-1
    steps:
      - id: s-email
        kind: short_text
        alias: email
      - id: s-phone
        kind: short_text
      - id: email
        kind: short_text
        alias: contactEmail
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_alias_resolves_to_step_id() {
        let vars = VariableTable::from_workflow(&make_workflow());
        assert_eq!(vars.resolve("email"), Some("s-email"));
    }

    #[test]
    fn test_alias_wins_over_same_spelled_id() {
        // "email" is both an alias of s-email and a raw step id; the alias
        // table is consulted first.
        let vars = VariableTable::from_workflow(&make_workflow());
        assert_eq!(vars.resolve("email"), Some("s-email"));
        assert_eq!(vars.resolve("contactEmail"), Some("email"));
    }

    #[test]
    fn test_direct_id_fallback() {
        let vars = VariableTable::from_workflow(&make_workflow());
        // The canonical branch hands back a borrow of the lookup name, so
        // resolve must accept a name owned by the caller.
        let name = String::from("s-phone");
        let resolved = vars.resolve(&name);
        assert_eq!(resolved, Some("s-phone"));
    }

    #[test]
    fn test_unknown_name() {
        let vars = VariableTable::from_workflow(&make_workflow());
        assert_eq!(vars.resolve("missing"), None);
        assert!(!vars.contains("missing"));
    }

    #[test]
    fn test_alias_of() {
        let vars = VariableTable::from_workflow(&make_workflow());
        assert_eq!(vars.alias_of("s-email"), Some("email"));
        assert_eq!(vars.alias_of("s-phone"), None);
    }
}
