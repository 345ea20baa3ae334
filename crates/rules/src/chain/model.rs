//! Rule chain definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{default_true, Rule, Severity};

/// The six chain composition strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainPattern {
    ConditionalChaining,
    SequentialDependency,
    ResultBasedRouting,
    AccumulativeChaining,
    ComplexWorkflow,
    FluentBuilder,
}

impl ChainPattern {
    pub const ALL: [ChainPattern; 6] = [
        ChainPattern::ConditionalChaining,
        ChainPattern::SequentialDependency,
        ChainPattern::ResultBasedRouting,
        ChainPattern::AccumulativeChaining,
        ChainPattern::ComplexWorkflow,
        ChainPattern::FluentBuilder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainPattern::ConditionalChaining => "conditional-chaining",
            ChainPattern::SequentialDependency => "sequential-dependency",
            ChainPattern::ResultBasedRouting => "result-based-routing",
            ChainPattern::AccumulativeChaining => "accumulative-chaining",
            ChainPattern::ComplexWorkflow => "complex-workflow",
            ChainPattern::FluentBuilder => "fluent-builder",
        }
    }
}

impl fmt::Display for ChainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown chain pattern: '{}'", s))
    }
}

/// A configured rule chain. `configuration` is pattern-specific and is
/// interpreted (and validated) by the pattern's executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleChain {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub pattern: ChainPattern,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_chain_priority")]
    pub priority: i32,
    #[serde(default)]
    pub configuration: Value,
}

fn default_chain_priority() -> i32 {
    100
}

impl RuleChain {
    pub fn new(id: impl Into<String>, pattern: ChainPattern, configuration: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            pattern,
            enabled: true,
            priority: default_chain_priority(),
            configuration,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Inline rule as written inside chain configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainRuleSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl ChainRuleSpec {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            condition: condition.into(),
            message: String::new(),
            severity: None,
        }
    }

    /// Materialize as a [`Rule`], naming it `fallback` when no id/name is set.
    pub fn to_rule(&self, fallback: &str) -> Rule {
        let id = self.id.clone().or_else(|| self.name.clone()).unwrap_or_else(|| fallback.to_string());
        let mut rule = Rule::new(id, self.condition.clone()).with_message(self.message.clone());
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(severity) = self.severity {
            rule = rule.with_severity(severity);
        }
        rule
    }
}
