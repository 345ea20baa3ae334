//! Fluent builder: a tree of rules with success and failure continuations.
//!
//! Chains can be written in YAML (`root-rule` with nested `on-success` /
//! `on-failure` blocks) or assembled in code with [`FluentChainBuilder`];
//! both produce the same configuration and run through the same executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::engine::Severity;
use crate::validation::ValidationResult;

/// Nodes deeper than this are rejected.
const MAX_DEPTH: usize = 64;

/// One rule in the decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FluentNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub condition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Box<FluentBranch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<Box<FluentBranch>>,
}

/// `on-success` / `on-failure` wrapper: `{rule: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluentBranch {
    pub rule: FluentNode,
}

impl FluentNode {
    pub fn rule(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            condition: condition.into(),
            message: String::new(),
            severity: None,
            on_success: None,
            on_failure: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn on_success(mut self, next: FluentNode) -> Self {
        self.on_success = Some(Box::new(FluentBranch { rule: next }));
        self
    }

    pub fn on_failure(mut self, next: FluentNode) -> Self {
        self.on_failure = Some(Box::new(FluentBranch { rule: next }));
        self
    }

    fn spec(&self) -> ChainRuleSpec {
        ChainRuleSpec {
            id: self.id.clone(),
            name: self.name.clone(),
            condition: self.condition.clone(),
            message: self.message.clone(),
            severity: self.severity,
        }
    }

    fn check(&self, path: &str, depth: usize, result: &mut ValidationResult) {
        if depth > MAX_DEPTH {
            result.error(path, format!("rule tree deeper than {MAX_DEPTH} levels"));
            return;
        }
        if self.condition.trim().is_empty() {
            result.error(format!("{path}.condition"), "must not be empty");
        }
        if let Some(next) = &self.on_success {
            next.rule.check(&format!("{path}.on-success.rule"), depth + 1, result);
        }
        if let Some(next) = &self.on_failure {
            next.rule.check(&format!("{path}.on-failure.rule"), depth + 1, result);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FluentConfig {
    root_rule: FluentNode,
}

/// Programmatic construction of a fluent-builder chain.
#[derive(Debug, Clone)]
pub struct FluentChainBuilder {
    id: String,
    name: Option<String>,
    priority: Option<i32>,
    root: Option<FluentNode>,
}

impl FluentChainBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            priority: None,
            root: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn root(mut self, node: FluentNode) -> Self {
        self.root = Some(node);
        self
    }

    /// Produce the chain definition; errors when no root rule was given.
    pub fn build(self) -> Result<RuleChain, String> {
        let root = self
            .root
            .ok_or_else(|| format!("fluent chain '{}' has no root rule", self.id))?;
        let configuration = serde_json::to_value(FluentConfig { root_rule: root }).map_err(|e| e.to_string())?;
        let mut chain = RuleChain::new(self.id, ChainPattern::FluentBuilder, configuration);
        if let Some(name) = self.name {
            chain.name = name;
        }
        if let Some(priority) = self.priority {
            chain.priority = priority;
        }
        Ok(chain)
    }
}

pub struct FluentBuilderExecutor {
    support: PatternSupport,
}

impl FluentBuilderExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }
}

impl PatternExecutor for FluentBuilderExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::FluentBuilder
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: FluentConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();
        config.root_rule.check("root-rule", 1, &mut result);
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let config: FluentConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        let mut result = ChainResult::new(chain);

        let mut node = &config.root_rule;
        let mut depth = 1;
        loop {
            let rule = node.spec().to_rule(&format!("node-{depth}"));
            ctx.enter_stage(rule.display_name().to_string());
            let outcome = self.support.execute_rule(&rule, ctx, &mut result);
            let triggered = outcome.is_triggered();
            result.record(ctx, format!("{}_result", rule.display_name()), triggered);

            let next = if triggered { &node.on_success } else { &node.on_failure };
            match next {
                Some(branch) if depth < MAX_DEPTH => {
                    debug!(from = %rule.display_name(), triggered, "following fluent branch");
                    node = &branch.rule;
                    depth += 1;
                }
                _ => {
                    result.record(ctx, "terminalRule", rule.display_name());
                    result.record(ctx, "terminalTriggered", triggered);
                    return result.with_path(ctx).succeed(rule.display_name().to_string());
                }
            }
        }
    }
}
