use std::collections::HashMap;

use super::model::{Rule, RuleGroup, RuleGroupDef};
use crate::loader::RuleError;

/// One entry of an ordered evaluation list.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleItem {
    Rule(Rule),
    Group(RuleGroup),
}

impl RuleItem {
    pub fn priority(&self) -> i32 {
        match self {
            RuleItem::Rule(r) => r.priority,
            RuleItem::Group(g) => g.priority,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RuleItem::Rule(r) => r.display_name(),
            RuleItem::Group(g) => &g.name,
        }
    }
}

/// Enabled rules and resolved groups of one rule-config document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub groups: Vec<RuleGroup>,
}

impl RuleSet {
    /// Resolve group references and drop disabled entries.
    ///
    /// Groups may reference disabled rules by id; those members are dropped
    /// from the group rather than failing resolution.
    pub fn build(rules: &[Rule], groups: &[RuleGroupDef]) -> Result<Self, RuleError> {
        let mut by_id = HashMap::new();
        for rule in rules {
            if by_id.insert(rule.id.clone(), rule.clone()).is_some() {
                return Err(RuleError::Validation(format!("duplicate rule id '{}'", rule.id)));
            }
        }

        let enabled: HashMap<String, Rule> = by_id
            .iter()
            .filter(|(_, r)| r.enabled)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();

        let mut resolved = Vec::new();
        for def in groups.iter().filter(|g| g.enabled) {
            for id in def.rule_ids.iter().chain(def.rule_references.iter().map(|r| &r.rule_id)) {
                if !by_id.contains_key(id) {
                    return Err(RuleError::Validation(format!(
                        "rule group '{}' references unknown rule '{}'",
                        def.id, id
                    )));
                }
            }
            let mut trimmed = def.clone();
            trimmed.rule_ids.retain(|id| enabled.contains_key(id));
            trimmed.rule_references.retain(|r| enabled.contains_key(&r.rule_id));
            resolved.push(RuleGroup::resolve(&trimmed, &enabled)?);
        }

        Ok(Self {
            rules: rules.iter().filter(|r| r.enabled).cloned().collect(),
            groups: resolved,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.groups.is_empty()
    }

    /// Rules then groups, each sorted by ascending priority (stable).
    pub fn items(&self) -> Vec<RuleItem> {
        let mut items: Vec<RuleItem> = self
            .rules
            .iter()
            .cloned()
            .map(RuleItem::Rule)
            .chain(self.groups.iter().cloned().map(RuleItem::Group))
            .collect();
        items.sort_by_key(RuleItem::priority);
        items
    }
}
