//! Accumulative chaining: weighted scores summed into an accumulator.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::engine::RuleResult;
use crate::expression::{is_truthy, parse_number, to_label, to_number};
use crate::validation::ValidationResult;

const DEFAULT_ACCUMULATOR: &str = "totalScore";
const DEFAULT_DYNAMIC_THRESHOLD: f64 = 0.5;
const DECISION_UNKNOWN: &str = "UNKNOWN";
const DECISION_ERROR: &str = "ERROR";

fn default_accumulator() -> String {
    DEFAULT_ACCUMULATOR.to_string()
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AccumulativeConfig {
    #[serde(default = "default_accumulator")]
    accumulator_variable: String,
    #[serde(default)]
    initial_value: Option<Value>,
    #[serde(default)]
    accumulation_rules: Vec<AccumulationRule>,
    #[serde(default)]
    rule_selection: Option<RuleSelection>,
    #[serde(default)]
    final_decision_rule: Option<ChainRuleSpec>,
}

/// One weighted component of an accumulative chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccumulationRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub condition: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// HIGH, MEDIUM or LOW; absent or unknown ranks as LOW.
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl AccumulationRule {
    pub fn new(id: impl Into<String>, condition: impl Into<String>, weight: f64) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            condition: condition.into(),
            weight,
            priority: None,
            message: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("rule_{index}"))
    }

    pub fn priority_rank(&self) -> u8 {
        priority_rank(self.priority.as_deref().unwrap_or("LOW"))
    }
}

/// HIGH=3, MEDIUM=2, LOW (or anything else)=1.
pub fn priority_rank(priority: &str) -> u8 {
    match priority.to_ascii_uppercase().as_str() {
        "HIGH" => 3,
        "MEDIUM" => 2,
        _ => 1,
    }
}

/// `rule-selection` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleSelection {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub weight_threshold: Option<f64>,
    #[serde(default)]
    pub max_rules: Option<usize>,
    #[serde(default)]
    pub min_priority: Option<String>,
    #[serde(default)]
    pub threshold_expression: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    All,
    WeightThreshold,
    TopWeighted,
    PriorityBased,
    DynamicThreshold,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::All => "all",
            SelectionStrategy::WeightThreshold => "weight-threshold",
            SelectionStrategy::TopWeighted => "top-weighted",
            SelectionStrategy::PriorityBased => "priority-based",
            SelectionStrategy::DynamicThreshold => "dynamic-threshold",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SelectionStrategy::All),
            "weight-threshold" => Ok(SelectionStrategy::WeightThreshold),
            "top-weighted" => Ok(SelectionStrategy::TopWeighted),
            "priority-based" => Ok(SelectionStrategy::PriorityBased),
            "dynamic-threshold" => Ok(SelectionStrategy::DynamicThreshold),
            other => Err(format!("unknown rule selection strategy: '{}'", other)),
        }
    }
}

impl RuleSelection {
    /// Configured strategy; absent or unknown means `all`.
    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(SelectionStrategy::All)
    }
}

/// Filter and order rules according to the selection block.
///
/// `threshold` evaluates the dynamic-threshold expression; `Err` means the
/// expression failed and every rule is selected.
pub fn select_rules<'a>(
    selection: Option<&RuleSelection>,
    rules: &'a [AccumulationRule],
    threshold: impl FnOnce(&str) -> Result<Option<f64>, String>,
) -> Vec<&'a AccumulationRule> {
    let all: Vec<&AccumulationRule> = rules.iter().collect();
    let Some(selection) = selection else {
        return all;
    };

    match selection.strategy() {
        SelectionStrategy::All => all,
        SelectionStrategy::WeightThreshold => {
            let cutoff = selection.weight_threshold.unwrap_or(0.0);
            all.into_iter().filter(|r| r.weight >= cutoff).collect()
        }
        SelectionStrategy::TopWeighted => {
            let max = selection.max_rules.unwrap_or(rules.len());
            let mut sorted = all;
            sorted.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
            sorted.truncate(max);
            sorted
        }
        SelectionStrategy::PriorityBased => {
            let min = priority_rank(selection.min_priority.as_deref().unwrap_or("LOW"));
            let mut kept: Vec<&AccumulationRule> =
                all.into_iter().filter(|r| r.priority_rank() >= min).collect();
            kept.sort_by(|a, b| {
                b.priority_rank()
                    .cmp(&a.priority_rank())
                    .then(b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal))
            });
            kept
        }
        SelectionStrategy::DynamicThreshold => {
            let expression = selection.threshold_expression.as_deref().unwrap_or("0.5");
            match threshold(expression) {
                Ok(cutoff) => {
                    let cutoff = cutoff.unwrap_or(DEFAULT_DYNAMIC_THRESHOLD);
                    debug!(threshold = cutoff, "dynamic threshold calculated");
                    all.into_iter().filter(|r| r.weight >= cutoff).collect()
                }
                Err(e) => {
                    warn!(expression = %expression, error = %e, "dynamic threshold failed, selecting all rules");
                    all
                }
            }
        }
    }
}

pub struct AccumulativeChainingExecutor {
    support: PatternSupport,
}

impl AccumulativeChainingExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }
}

impl PatternExecutor for AccumulativeChainingExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::AccumulativeChaining
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: AccumulativeConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();

        if config.accumulator_variable.trim().is_empty() {
            result.error("accumulator-variable", "must not be empty");
        }
        if let Some(initial) = &config.initial_value {
            if parse_number(initial).is_none() {
                result.error("initial-value", format!("'{}' is not a number", to_label(initial)));
            }
        }
        if config.accumulation_rules.is_empty() {
            result.error("accumulation-rules", "at least one accumulation rule is required");
        }
        for (i, rule) in config.accumulation_rules.iter().enumerate() {
            if rule.condition.trim().is_empty() {
                result.error(format!("accumulation-rules[{i}].condition"), "must not be empty");
            }
            if let Some(p) = &rule.priority {
                if !["HIGH", "MEDIUM", "LOW"].contains(&p.to_ascii_uppercase().as_str()) {
                    result.warn(format!("accumulation-rules[{i}].priority"), format!("'{p}' ranks as LOW"));
                }
            }
        }

        if let Some(selection) = &config.rule_selection {
            match selection.strategy.as_deref().map(str::parse::<SelectionStrategy>) {
                Some(Err(e)) => result.warn("rule-selection.strategy", format!("{e}; all rules will run")),
                Some(Ok(SelectionStrategy::WeightThreshold)) if selection.weight_threshold.is_none() => {
                    result.warn("rule-selection.weight-threshold", "not set; defaults to 0.0")
                }
                Some(Ok(SelectionStrategy::TopWeighted)) if selection.max_rules == Some(0) => {
                    result.error("rule-selection.max-rules", "must be at least 1")
                }
                Some(Ok(SelectionStrategy::DynamicThreshold)) if selection.threshold_expression.is_none() => {
                    result.warn("rule-selection.threshold-expression", "not set; defaults to 0.5")
                }
                _ => {}
            }
        }

        if let Some(decision) = &config.final_decision_rule {
            if decision.condition.trim().is_empty() {
                result.error("final-decision-rule.condition", "must not be empty");
            }
        }
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let config: AccumulativeConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        let mut result = ChainResult::new(chain);
        let acc = config.accumulator_variable.as_str();

        let initial = config.initial_value.as_ref().map(to_number).unwrap_or(0.0);
        ctx.set(acc, initial);
        result.record(ctx, acc, initial);
        result.record(ctx, format!("{acc}_initial"), initial);

        let selected = select_rules(config.rule_selection.as_ref(), &config.accumulation_rules, |expr| {
            match self.support.evaluate(expr, ctx) {
                Ok(Value::Null) => Ok(None),
                Ok(v) => Ok(parse_number(&v)),
                Err(e) => Err(e.to_string()),
            }
        });
        info!(
            chain_id = %chain.id,
            available = config.accumulation_rules.len(),
            selected = selected.len(),
            "accumulation rules selected"
        );
        result.record(ctx, "total_rules_available", config.accumulation_rules.len());
        result.record(ctx, "rules_selected_for_execution", selected.len());

        ctx.enter_stage("accumulation-rules-execution");
        let mut score = initial;
        for (i, rule) in selected.into_iter().enumerate() {
            let index = i + 1;
            let name = rule.label(index);
            let component = match self.support.evaluate(&rule.condition, ctx) {
                Ok(value) => {
                    let tracked = if is_truthy(&value) {
                        RuleResult::triggered(&name, rule.message.clone())
                    } else {
                        RuleResult::not_triggered(&name)
                    };
                    result.executed_rules.push(tracked);
                    to_number(&value)
                }
                Err(e) => {
                    warn!(chain_id = %chain.id, rule = %name, error = %e, "accumulation rule failed, contributing 0");
                    result
                        .executed_rules
                        .push(RuleResult::error(&name, e.to_string(), Some(e.to_string())));
                    0.0
                }
            };
            let weighted = component * rule.weight;
            score += weighted;
            debug!(rule = %name, component, weight = rule.weight, weighted, total = score, "accumulated");

            result.record(ctx, format!("component_{index}_{name}_score"), component);
            result.record(ctx, format!("component_{index}_{name}_weighted"), weighted);
            ctx.set(acc, score);
            result.record(ctx, acc, score);
        }
        result.record(ctx, format!("{acc}_final"), score);

        let decision = match &config.final_decision_rule {
            Some(rule) => {
                ctx.enter_stage("final-decision-execution");
                let label = match self.support.evaluate(&rule.condition, ctx) {
                    Ok(Value::Null) => DECISION_UNKNOWN.to_string(),
                    Ok(value) => to_label(&value),
                    Err(e) => {
                        warn!(chain_id = %chain.id, error = %e, "final decision rule failed");
                        DECISION_ERROR.to_string()
                    }
                };
                result.record(ctx, "finalDecision", label.clone());
                label
            }
            None => {
                result.record(ctx, "finalDecision", Value::Null);
                "ACCUMULATION_COMPLETED".to_string()
            }
        };

        result.with_path(ctx).succeed(decision)
    }
}
