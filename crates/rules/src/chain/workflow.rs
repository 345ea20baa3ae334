//! Complex workflow: dependency-ordered stages of rules, optionally branching.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use super::context::ChainContext;
use super::executor::{invalid_shape, parse_config, parse_or_fail, PatternExecutor, PatternSupport};
use super::model::{ChainPattern, ChainRuleSpec, RuleChain};
use super::result::ChainResult;
use crate::dag::{find_cycles, topological_order};
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Deserialize)]
struct WorkflowConfig {
    #[serde(default)]
    stages: Vec<WorkflowStage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WorkflowStage {
    #[serde(deserialize_with = "scalar_string")]
    stage: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    rules: Vec<ChainRuleSpec>,
    #[serde(default)]
    failure_action: Option<String>,
    #[serde(default)]
    output_variable: Option<String>,
    #[serde(default)]
    conditional_execution: Option<ConditionalExecution>,
}

impl WorkflowStage {
    fn terminates_on_failure(&self) -> bool {
        self.failure_action.as_deref() == Some("terminate")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConditionalExecution {
    condition: String,
    #[serde(default)]
    on_true: Option<Branch>,
    #[serde(default)]
    on_false: Option<Branch>,
}

/// `on-true: [rules]` or `on-true: {rules: [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Branch {
    Rules(Vec<ChainRuleSpec>),
    Block {
        #[serde(default)]
        rules: Vec<ChainRuleSpec>,
    },
}

impl Branch {
    fn rules(&self) -> &[ChainRuleSpec] {
        match self {
            Branch::Rules(rules) | Branch::Block { rules } => rules,
        }
    }
}

/// Stage ids may be written as numbers.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("stage id must be a string, got {other}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "SUCCESS",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        }
    }
}

fn dependency_graph(stages: &[WorkflowStage]) -> IndexMap<String, Vec<String>> {
    stages
        .iter()
        .map(|s| (s.stage.clone(), s.depends_on.clone()))
        .collect()
}

pub struct ComplexWorkflowExecutor {
    support: PatternSupport,
}

impl ComplexWorkflowExecutor {
    pub fn new(support: PatternSupport) -> Self {
        Self { support }
    }

    fn run_stage(&self, stage: &WorkflowStage, ctx: &mut ChainContext, result: &mut ChainResult) -> StageStatus {
        let rules: &[ChainRuleSpec] = match &stage.conditional_execution {
            None => &stage.rules,
            Some(cond) => match self.support.evaluate_condition(&cond.condition, ctx) {
                Ok(true) => cond.on_true.as_ref().map_or(&[], Branch::rules),
                Ok(false) => cond.on_false.as_ref().map_or(&[], Branch::rules),
                Err(e) => {
                    warn!(stage = %stage.stage, error = %e, "conditional execution failed");
                    return StageStatus::Failed;
                }
            },
        };

        let mut all_passed = true;
        let mut output = None;
        for (i, spec) in rules.iter().enumerate() {
            let rule = spec.to_rule(&format!("{}-{}", stage.stage, i + 1));
            let outcome = self.support.execute_rule(&rule, ctx, result);
            if outcome.is_triggered() {
                if stage.output_variable.is_some() {
                    output = self.support.evaluate(&rule.condition, ctx).ok();
                }
            } else {
                all_passed = false;
                if stage.terminates_on_failure() {
                    break;
                }
            }
        }

        if let (Some(var), Some(value)) = (&stage.output_variable, output) {
            ctx.set(var.clone(), value.clone());
            result.record(ctx, var.clone(), value);
        }
        if all_passed {
            StageStatus::Success
        } else {
            StageStatus::Failed
        }
    }
}

impl PatternExecutor for ComplexWorkflowExecutor {
    fn pattern(&self) -> ChainPattern {
        ChainPattern::ComplexWorkflow
    }

    fn validate_configuration(&self, configuration: &Value) -> ValidationResult {
        let config: WorkflowConfig = match parse_config(configuration) {
            Ok(c) => c,
            Err(e) => return invalid_shape(e),
        };
        let mut result = ValidationResult::new();
        if config.stages.is_empty() {
            result.error("stages", "at least one stage is required");
            return result;
        }

        let ids: HashSet<&str> = config.stages.iter().map(|s| s.stage.as_str()).collect();
        let mut seen = HashSet::new();
        for (i, stage) in config.stages.iter().enumerate() {
            let path = format!("stages[{i}]");
            if stage.stage.trim().is_empty() {
                result.error(format!("{path}.stage"), "must not be empty");
            } else if !seen.insert(stage.stage.as_str()) {
                result.error(format!("{path}.stage"), format!("duplicate stage id '{}'", stage.stage));
            }
            if let Some(action) = &stage.failure_action {
                if action != "terminate" && action != "continue" {
                    result.error(
                        format!("{path}.failure-action"),
                        format!("'{action}' must be 'terminate' or 'continue'"),
                    );
                }
            }
            for dep in &stage.depends_on {
                if !ids.contains(dep.as_str()) {
                    result.error(format!("{path}.depends-on"), format!("unknown stage '{dep}'"));
                }
            }
            let has_branch = stage.conditional_execution.is_some();
            if stage.rules.is_empty() && !has_branch {
                result.warn(path.clone(), "stage has no rules");
            }
            let branch_rules = stage.conditional_execution.iter().flat_map(|c| {
                c.on_true.iter().chain(c.on_false.iter()).flat_map(|b| b.rules().iter())
            });
            for spec in stage.rules.iter().chain(branch_rules) {
                if spec.condition.trim().is_empty() {
                    result.error(format!("{path}.rules"), "rule condition must not be empty");
                }
            }
        }

        if let Some(cycle) = find_cycles(&dependency_graph(&config.stages), true).into_iter().next() {
            result.error("stages", format!("circular dependency: {}", cycle.join(" -> ")));
        }
        result
    }

    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        let config: WorkflowConfig = match parse_or_fail(chain) {
            Ok(c) => c,
            Err(failed) => return failed,
        };
        let mut result = ChainResult::new(chain);

        let order = match topological_order(&dependency_graph(&config.stages)) {
            Ok(order) => order,
            Err(stuck) => {
                return result.fail(format!("Circular dependency among stages: {}", stuck.join(", ")));
            }
        };

        let mut statuses: IndexMap<String, StageStatus> = IndexMap::new();
        for id in order {
            let Some(stage) = config.stages.iter().find(|s| s.stage == id) else {
                continue;
            };
            ctx.enter_stage(stage.name.clone().unwrap_or_else(|| stage.stage.clone()));

            let blocked = stage
                .depends_on
                .iter()
                .any(|d| statuses.get(d).map_or(false, |s| *s != StageStatus::Success));
            let status = if blocked {
                debug!(stage = %stage.stage, "dependency did not succeed, skipping stage");
                StageStatus::Skipped
            } else {
                self.run_stage(stage, ctx, &mut result)
            };
            result.record(ctx, format!("stage_{}_result", stage.stage), status.as_str());
            statuses.insert(stage.stage.clone(), status);

            if status == StageStatus::Failed && stage.terminates_on_failure() {
                return result
                    .with_path(ctx)
                    .fail(format!("Stage '{}' failed with terminate action", stage.stage));
            }
        }

        result.with_path(ctx).succeed("COMPLEX_WORKFLOW_COMPLETED")
    }
}
