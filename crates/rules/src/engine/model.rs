//! Static rule definitions: rules, groups and categories.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::loader::RuleError;

pub(crate) fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

// ── Severity ────────────────────────────────────────────────────────

/// How serious a rule's failure is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Severity {
    /// Failures at this severity block a stage.
    pub fn is_blocking(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: '{}'", other)),
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// A named category a rule belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

/// A single condition with its reporting attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub condition: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Rule {
    pub fn new(id: impl Into<String>, condition: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            condition: condition.into(),
            message: String::new(),
            description: None,
            categories: vec!["default".to_string()],
            priority: default_priority(),
            severity: Severity::default(),
            enabled: true,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn categories(&self) -> Vec<&str> {
        if self.categories.is_empty() {
            vec!["default"]
        } else {
            self.categories.iter().map(String::as_str).collect()
        }
    }
}

// ── Rule groups ─────────────────────────────────────────────────────

/// How a group combines member outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    #[default]
    And,
    Or,
}

/// Reference from a group to a rule, with its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleReference {
    pub rule_id: String,
    #[serde(default)]
    pub sequence: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Wire form of a rule group as written in rule-config documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleGroupDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub operator: GroupOperator,
    #[serde(default)]
    pub stop_on_first_failure: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub rule_ids: Vec<String>,
    #[serde(default)]
    pub rule_references: Vec<RuleReference>,
}

/// A resolved group: ordered `(rule, sequence)` pairs combined with AND/OR.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleGroup {
    pub id: String,
    pub name: String,
    pub message: String,
    pub operator: GroupOperator,
    pub stop_on_first_failure: bool,
    pub priority: i32,
    rules: Vec<(Rule, u32)>,
}

impl RuleGroup {
    pub fn new(id: impl Into<String>, operator: GroupOperator) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            message: String::new(),
            operator,
            stop_on_first_failure: false,
            priority: default_priority(),
            rules: Vec::new(),
        }
    }

    pub fn stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a rule at `sequence`; members stay sorted by sequence.
    pub fn add_rule(&mut self, rule: Rule, sequence: u32) {
        let pos = self.rules.partition_point(|(_, s)| *s <= sequence);
        self.rules.insert(pos, (rule, sequence));
    }

    pub fn with_rule(mut self, rule: Rule, sequence: u32) -> Self {
        self.add_rule(rule, sequence);
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|(r, _)| r)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve a wire definition against the rules it references.
    pub fn resolve(def: &RuleGroupDef, rules: &HashMap<String, Rule>) -> Result<Self, RuleError> {
        let mut group = RuleGroup::new(def.id.clone(), def.operator)
            .stop_on_first_failure(def.stop_on_first_failure)
            .with_message(def.message.clone());
        if !def.name.is_empty() {
            group.name = def.name.clone();
        }
        group.priority = def.priority;

        let plain = def.rule_ids.iter().enumerate().map(|(i, id)| RuleReference {
            rule_id: id.clone(),
            sequence: Some(i as u32 + 1),
            enabled: true,
        });
        let offset = def.rule_ids.len() as u32;
        let referenced = def.rule_references.iter().enumerate().map(|(i, r)| RuleReference {
            sequence: r.sequence.or(Some(offset + i as u32 + 1)),
            ..r.clone()
        });

        for reference in plain.chain(referenced).filter(|r| r.enabled) {
            let rule = rules.get(&reference.rule_id).ok_or_else(|| {
                RuleError::Validation(format!(
                    "rule group '{}' references unknown rule '{}'",
                    def.id, reference.rule_id
                ))
            })?;
            group.add_rule(rule.clone(), reference.sequence.unwrap_or(0));
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_and_parsing() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error.is_blocking());
        assert!(!Severity::Warning.is_blocking());
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn group_members_sorted_by_sequence() {
        let group = RuleGroup::new("g", GroupOperator::And)
            .with_rule(Rule::new("c", "true"), 3)
            .with_rule(Rule::new("a", "true"), 1)
            .with_rule(Rule::new("b", "true"), 2);
        let ids: Vec<_> = group.rules().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn resolve_rejects_unknown_rule() {
        let def: RuleGroupDef = serde_yaml::from_str("id: g\nrule-ids: [missing]\n").unwrap();
        assert!(RuleGroup::resolve(&def, &HashMap::new()).is_err());
    }

    #[test]
    fn rule_defaults_from_yaml() {
        let rule: Rule = serde_yaml::from_str("id: r\ncondition: 'x > 1'\n").unwrap();
        assert_eq!(rule.priority, 100);
        assert_eq!(rule.severity, Severity::Error);
        assert!(rule.enabled);
        assert_eq!(rule.display_name(), "r");
        assert_eq!(rule.categories(), vec!["default"]);
    }
}
