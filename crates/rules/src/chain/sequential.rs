//! Sequential dependency: each stage's value feeds the next stage's bindings.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::engine::RuleResult;
use crate::expression::{is_truthy, to_label};
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SequentialConfig {
    #[serde(default)]
    stages: Vec<SequentialStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SequentialStage {
    stage: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    rule: ChainRuleSpec,
    #[serde(default)]
    output_variable: Option<String>,
}

impl SequentialStage {
    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("stage-{}", self.stage))
    }
}

pub struct SequentialDependencyExecutor {
    support: PatternSupport,
}

impl SequentialDependencyExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }
}

impl PatternExecutor for SequentialDependencyExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::SequentialDependency
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: SequentialConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();
        if config.stages.is_empty() {
            result.error("stages", "at least one stage is required");
            return result;
        }

        let mut seen: HashMap<u32, usize> = HashMap::new();
        let mut producers: HashMap<&str, u32> = HashMap::new();
        for (i, stage) in config.stages.iter().enumerate() {
            if let Some(first) = seen.insert(stage.stage, i) {
                result.error(
                    format!("stages[{i}].stage"),
                    format!("stage number {} already used by stages[{first}]", stage.stage),
                );
            }
            if stage.rule.condition.trim().is_empty() {
                result.error(format!("stages[{i}].rule.condition"), "must not be empty");
            }
            if let Some(var) = stage.output_variable.as_deref() {
                producers.insert(var, stage.stage);
            }
        }
        for (i, stage) in config.stages.iter().enumerate() {
            for dep in &stage.depends_on {
                if let Some(&producer) = producers.get(dep.as_str()) {
                    if producer >= stage.stage {
                        result.error(
                            format!("stages[{i}].depends-on"),
                            format!("'{dep}' is produced by stage {producer}, which does not run before stage {}", stage.stage),
                        );
                    }
                }
            }
        }
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let mut config: SequentialConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        config.stages.sort_by_key(|s| s.stage);
        let mut result = ChainResult::new(chain);
        let mut last = Value::Null;

        for stage in &config.stages {
            let label = stage.label();
            ctx.enter_stage(label.clone());

            let missing: Vec<&str> = stage
                .depends_on
                .iter()
                .filter(|d| !ctx.contains(d))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return result.with_path(ctx).fail(format!(
                    "Stage {} ({}) is missing dependencies: {}",
                    stage.stage,
                    label,
                    missing.join(", ")
                ));
            }

            let value = match self.support.evaluate(&stage.rule.condition, ctx) {
                Ok(v) => v,
                Err(e) => {
                    warn!(chain_id = %chain.id, stage = stage.stage, error = %e, "sequential stage failed");
                    result
                        .executed_rules
                        .push(RuleResult::error(&label, e.to_string(), Some(e.to_string())));
                    return result
                        .with_path(ctx)
                        .fail(format!("Stage {} ({}) failed: {}", stage.stage, label, e));
                }
            };
            result.executed_rules.push(if is_truthy(&value) {
                RuleResult::triggered(&label, stage.rule.message.clone())
            } else {
                RuleResult::not_triggered(&label)
            });

            if let Some(var) = &stage.output_variable {
                ctx.set(var.clone(), value.clone());
                result.record(ctx, var.clone(), value.clone());
            }
            result.record(ctx, format!("stage_{}_result", stage.stage), value.clone());
            debug!(stage = stage.stage, value = %value, "sequential stage completed");
            last = value;
        }

        let outcome = to_label(&last);
        result.with_path(ctx).succeed(outcome)
    }
}
