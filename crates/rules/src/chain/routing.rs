//! Result-based routing: a router expression picks the rule set to run.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::engine::RuleResult;
use crate::expression::to_label;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RoutingChainConfig {
    router_rule: RouterRule,
    #[serde(default)]
    routes: IndexMap<String, Route>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RouterRule {
    #[serde(default)]
    id: Option<String>,
    condition: String,
    #[serde(default)]
    output_variable: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Route {
    #[serde(default)]
    rules: Vec<ChainRuleSpec>,
}

pub struct ResultBasedRoutingExecutor {
    support: PatternSupport,
}

impl ResultBasedRoutingExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }
}

impl PatternExecutor for ResultBasedRoutingExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::ResultBasedRouting
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: RoutingChainConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();
        if config.router_rule.condition.trim().is_empty() {
            result.error("router-rule.condition", "must not be empty");
        }
        if config.routes.is_empty() {
            result.error("routes", "at least one route is required");
        }
        for (key, route) in &config.routes {
            for (i, spec) in route.rules.iter().enumerate() {
                if spec.condition.trim().is_empty() {
                    result.error(format!("routes.{key}.rules[{i}].condition"), "must not be empty");
                }
            }
        }
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let config: RoutingChainConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        let mut result = ChainResult::new(chain);
        let router_name = config.router_rule.id.clone().unwrap_or_else(|| "router-rule".to_string());

        ctx.enter_stage("router-evaluation");
        let route_key = match self.support.evaluate(&config.router_rule.condition, ctx) {
            Ok(Value::Null) => None,
            Ok(value) => Some(to_label(&value)),
            Err(e) => {
                warn!(chain_id = %chain.id, error = %e, "router rule failed");
                result
                    .executed_rules
                    .push(RuleResult::error(&router_name, e.to_string(), Some(e.to_string())));
                None
            }
        };
        let Some(route_key) = route_key else {
            return result.with_path(ctx).fail("Router rule execution failed");
        };
        result
            .executed_rules
            .push(RuleResult::triggered(&router_name, format!("Routed to {route_key}")));

        if let Some(var) = &config.router_rule.output_variable {
            ctx.set(var.clone(), route_key.clone());
            result.record(ctx, var.clone(), route_key.clone());
        }
        result.record(ctx, "routeKey", route_key.clone());

        match config.routes.get(&route_key) {
            None => {
                debug!(chain_id = %chain.id, route = %route_key, "no rules configured for route");
                result.record(ctx, "routeExecutionResult", "NO_RULES_FOR_ROUTE");
            }
            Some(route) if route.rules.is_empty() => {
                result.record(ctx, "routeExecutionResult", "NO_RULES_CONFIGURED");
            }
            Some(route) => {
                ctx.enter_stage(format!("route-{route_key}-execution"));
                let mut triggered = 0usize;
                for (i, spec) in route.rules.iter().enumerate() {
                    let rule = spec.to_rule(&format!("{route_key}-{}", i + 1));
                    let outcome = self.support.execute_rule(&rule, ctx, &mut result);
                    if outcome.is_triggered() {
                        triggered += 1;
                    }
                    result.record(
                        ctx,
                        format!("route_{route_key}_{}_result", rule.display_name()),
                        outcome.is_triggered(),
                    );
                }
                result.record(ctx, "routeExecutionResult", "COMPLETED");
                result.record(ctx, "routeExecutedRules", route.rules.len());
                result.record(ctx, "routeTriggeredRules", triggered);
            }
        }

        result.with_path(ctx).succeed(format!("ROUTE_{route_key}_COMPLETED"))
    }
}
