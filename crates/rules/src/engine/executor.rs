//! [`RuleEngine`]: evaluates rules, groups and rule lists against bindings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::expression::{
    is_truthy, Bindings, ExpressionError, ExpressionEvaluator, ExpressionService, JinjaEvaluator,
};

use super::metrics::RuleMetrics;
use super::model::{GroupOperator, Rule, RuleGroup, Severity};
use super::recovery::{DefaultErrorRecovery, ErrorRecovery, RecoveryResult};
use super::result::{RuleResult, RuleSetOutcome};
use super::ruleset::{RuleItem, RuleSet};

/// Rule execution engine.
///
/// Holds the expression evaluator (with its compiled-expression cache), the
/// recovery capability and the evaluation metrics. Safe to share across
/// threads behind an `Arc`.
pub struct RuleEngine {
    expressions: ExpressionService,
    recovery: Arc<dyn ErrorRecovery>,
    metrics: RuleMetrics,
}

impl RuleEngine {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            expressions: ExpressionService::new(evaluator),
            recovery: Arc::new(DefaultErrorRecovery::default()),
            metrics: RuleMetrics::new(),
        }
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn ErrorRecovery>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_metrics_capacity(mut self, capacity: usize) -> Self {
        self.metrics = RuleMetrics::with_max_entries(capacity);
        self
    }

    pub fn expressions(&self) -> &ExpressionService {
        &self.expressions
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        self.expressions.evaluator()
    }

    pub fn metrics(&self) -> &RuleMetrics {
        &self.metrics
    }

    /// Evaluate an arbitrary expression through the cache.
    pub fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value, ExpressionError> {
        self.expressions.evaluate(expression, bindings)
    }

    pub fn evaluate_condition(&self, expression: &str, bindings: &Bindings) -> Result<bool, ExpressionError> {
        self.expressions.evaluate_condition(expression, bindings)
    }

    // ── Single rule ─────────────────────────────────────────────────

    /// Evaluate one rule.
    ///
    /// Missing variables produce an error result without reaching the
    /// evaluator. Evaluator failures go through the recovery capability.
    pub fn execute_rule(&self, rule: &Rule, bindings: &Bindings) -> RuleResult {
        let started = Instant::now();
        let name = rule.display_name();

        let result = match self.expressions.compile(&rule.condition) {
            Err(e) => self.recover(rule, bindings, e),
            Ok(compiled) => {
                let missing = compiled.missing_variables(bindings);
                if !missing.is_empty() {
                    debug!(rule = %name, missing = ?missing, "rule not evaluated: unbound variables");
                    RuleResult::error(
                        name,
                        format!("Missing required variables: {}", missing.join(", ")),
                        None,
                    )
                } else {
                    match self.expressions.evaluate_compiled(&compiled, bindings) {
                        Ok(value) if is_truthy(&value) => RuleResult::triggered(name, rule.message.clone()),
                        Ok(_) => RuleResult::not_triggered(name).with_message(rule.message.clone()),
                        Err(e) => self.recover(rule, bindings, e),
                    }
                }
            }
        };
        let elapsed = started.elapsed().as_micros() as u64;

        let result = result.with_severity(rule.severity).with_elapsed_micros(elapsed);
        self.metrics.record(name, result.kind, elapsed, result.cause.clone());
        result
    }

    fn recover(&self, rule: &Rule, bindings: &Bindings, cause: ExpressionError) -> RuleResult {
        let name = rule.display_name();
        warn!(rule = %name, error = %cause, "rule evaluation failed, attempting recovery");
        match self.recovery.attempt(name, &rule.condition, bindings, &cause) {
            RecoveryResult::Recovered { strategy, result } => {
                debug!(rule = %name, strategy = ?strategy, "rule evaluation recovered");
                result
            }
            RecoveryResult::Failed { reason, .. } => RuleResult::error(
                name,
                format!("Error evaluating rule '{}': {}", name, reason),
                Some(cause.to_string()),
            ),
        }
    }

    // ── Groups ──────────────────────────────────────────────────────

    /// Combine member outcomes with the group's operator.
    ///
    /// AND groups with `stop_on_first_failure` stop at the first member that
    /// does not trigger; OR groups stop at the first member that does. The
    /// result carries the highest severity among failed members.
    pub fn execute_group(&self, group: &RuleGroup, bindings: &Bindings) -> RuleResult {
        let started = Instant::now();
        let mut failed_severity: Option<Severity> = None;
        let mut failures = Vec::new();
        let mut any_triggered = false;
        let mut all_triggered = true;

        for rule in group.rules() {
            let result = self.execute_rule(rule, bindings);
            if result.is_triggered() {
                any_triggered = true;
                if group.operator == GroupOperator::Or {
                    break;
                }
            } else {
                all_triggered = false;
                failed_severity = failed_severity.max(Some(rule.severity));
                failures.push(if result.is_error() {
                    result.message.clone()
                } else if rule.message.is_empty() {
                    format!("Rule '{}' did not match", rule.display_name())
                } else {
                    rule.message.clone()
                });
                if group.operator == GroupOperator::And && group.stop_on_first_failure {
                    break;
                }
            }
        }

        let matched = match group.operator {
            GroupOperator::And => !group.is_empty() && all_triggered,
            GroupOperator::Or => any_triggered,
        };

        let elapsed = started.elapsed().as_micros() as u64;
        let mut result = if matched {
            RuleResult::triggered(&group.name, group.message.clone())
        } else {
            RuleResult::not_triggered(&group.name)
                .with_message(group.message.clone())
                .with_severity(failed_severity.unwrap_or_default())
        };
        result.failure_messages = failures;
        self.metrics.record(&group.name, result.kind, elapsed, None);
        result.with_elapsed_micros(elapsed)
    }

    // ── Lists ───────────────────────────────────────────────────────

    /// Evaluate rules in order; the first that triggers wins.
    pub fn execute_rules(&self, rules: &[Rule], bindings: &Bindings) -> RuleResult {
        for rule in rules.iter().filter(|r| r.enabled) {
            let result = self.execute_rule(rule, bindings);
            if result.is_triggered() {
                return result;
            }
            if result.is_error() {
                debug!(rule = %rule.display_name(), "rule errored, continuing with next rule");
            }
        }
        RuleResult::no_match()
    }

    /// Evaluate a mixed rule/group list in order; first match wins.
    pub fn execute_items(&self, items: &[RuleItem], bindings: &Bindings) -> RuleResult {
        for item in items {
            let result = match item {
                RuleItem::Rule(rule) if !rule.enabled => continue,
                RuleItem::Rule(rule) => self.execute_rule(rule, bindings),
                RuleItem::Group(group) => self.execute_group(group, bindings),
            };
            if result.is_triggered() {
                return result;
            }
        }
        RuleResult::no_match()
    }

    /// Evaluate every standalone rule and every group of a rule set.
    ///
    /// Rules that belong to a group are evaluated only through the group.
    /// Errors and untriggered ERROR/CRITICAL entries are blocking failures;
    /// untriggered INFO/WARNING entries are recorded as warnings.
    pub fn evaluate_rule_set(&self, rule_set: &RuleSet, bindings: &Bindings) -> RuleSetOutcome {
        let grouped: HashSet<&str> = rule_set
            .groups
            .iter()
            .flat_map(|g| g.rules().map(|r| r.id.as_str()))
            .collect();

        let mut outcome = RuleSetOutcome {
            results: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        };

        for item in rule_set.items() {
            let result = match &item {
                RuleItem::Rule(rule) if grouped.contains(rule.id.as_str()) => continue,
                RuleItem::Rule(rule) => self.execute_rule(rule, bindings),
                RuleItem::Group(group) => self.execute_group(group, bindings),
            };

            if !result.is_triggered() {
                let message = if result.is_error() || result.message.is_empty() {
                    format!("{}: {}", item.name(), describe_failure(&result))
                } else {
                    result.message.clone()
                };
                if result.is_error() || result.severity.is_blocking() {
                    outcome.failures.push(message);
                } else {
                    outcome.warnings.push(message);
                }
            }
            outcome.results.push(result);
        }

        outcome
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(Arc::new(JinjaEvaluator::new()))
    }
}

fn describe_failure(result: &RuleResult) -> String {
    if result.is_error() {
        result.message.clone()
    } else if !result.failure_messages.is_empty() {
        result.failure_messages.join("; ")
    } else {
        "condition not met".to_string()
    }
}
