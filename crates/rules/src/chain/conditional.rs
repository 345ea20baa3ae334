//! Conditional chaining: a trigger rule selects which follow-up rules run.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConditionalConfig {
    trigger_rule: ChainRuleSpec,
    #[serde(default)]
    conditional_rules: Option<ConditionalRules>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConditionalRules {
    #[serde(default)]
    on_trigger: Vec<ChainRuleSpec>,
    #[serde(default)]
    on_no_trigger: Vec<ChainRuleSpec>,
}

pub struct ConditionalChainingExecutor {
    support: PatternSupport,
}

impl ConditionalChainingExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }
}

impl PatternExecutor for ConditionalChainingExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::ConditionalChaining
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: ConditionalConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();
        if config.trigger_rule.condition.trim().is_empty() {
            result.error("trigger-rule.condition", "must not be empty");
        }
        match &config.conditional_rules {
            None => result.error("conditional-rules", "missing; expected on-trigger and/or on-no-trigger"),
            Some(rules) => {
                if rules.on_trigger.is_empty() && rules.on_no_trigger.is_empty() {
                    result.warn("conditional-rules", "both branches are empty");
                }
                let branches = [("on-trigger", &rules.on_trigger), ("on-no-trigger", &rules.on_no_trigger)];
                for (branch, specs) in branches {
                    for (i, spec) in specs.iter().enumerate() {
                        if spec.condition.trim().is_empty() {
                            result.error(format!("conditional-rules.{branch}[{i}].condition"), "must not be empty");
                        }
                    }
                }
            }
        }
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let config: ConditionalConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        let mut result = ChainResult::new(chain);

        ctx.enter_stage("trigger");
        let trigger = self
            .support
            .execute_rule(&config.trigger_rule.to_rule("trigger-rule"), ctx, &mut result);
        if trigger.is_error() {
            return result
                .with_path(ctx)
                .fail(format!("Trigger rule evaluation failed: {}", trigger.message));
        }
        let triggered = trigger.is_triggered();
        result.record(ctx, "triggerResult", triggered);

        let rules = config.conditional_rules.unwrap_or_default();
        let (branch, specs) = if triggered {
            ("on-trigger", rules.on_trigger)
        } else {
            ("on-no-trigger", rules.on_no_trigger)
        };
        debug!(chain_id = %chain.id, branch, rules = specs.len(), "conditional branch selected");

        ctx.enter_stage(branch);
        for (i, spec) in specs.iter().enumerate() {
            let rule = spec.to_rule(&format!("{branch}-{}", i + 1));
            let outcome = self.support.execute_rule(&rule, ctx, &mut result);
            result.record(ctx, format!("{}_result", rule.display_name()), outcome.is_triggered());
        }
        result.record(ctx, "conditionalRulesExecuted", specs.len());

        let outcome = if triggered { "TRIGGERED" } else { "NOT_TRIGGERED" };
        result.with_path(ctx).succeed(outcome)
    }
}
