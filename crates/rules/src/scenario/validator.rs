//! Pre-execution checks of a scenario's stage DAG.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use super::model::{FailurePolicy, ProcessingStage, ScenarioConfiguration};
use crate::dag::{find_cycles, topological_order};
use crate::validation::fuzzy::fuzzy_match;
use crate::validation::ValidationResult;

/// Validate a scenario's stage definitions.
///
/// Stage-level checks are collected exhaustively; cycle detection stops at
/// the first cycle found. A result with errors blocks execution.
pub fn validate_scenario(scenario: &ScenarioConfiguration) -> ValidationResult {
    let mut result = ValidationResult::new();

    if scenario.scenario_id.trim().is_empty() {
        result.error("scenario-id", "scenario-id must not be empty");
    }

    if scenario.has_stage_configuration() && !scenario.rule_configurations.is_empty() {
        result.warn(
            "rule-configurations",
            "both processing-stages and rule-configurations are defined; rule-configurations are ignored",
        );
    }
    if !scenario.has_stage_configuration() {
        if scenario.rule_configurations.is_empty() {
            result.warn("", "scenario defines neither processing-stages nor rule-configurations");
        }
        for (i, file) in scenario.rule_configurations.iter().enumerate() {
            if file.trim().is_empty() {
                result.error(format!("rule-configurations[{i}]"), "config file reference must not be empty");
            }
        }
        return result;
    }

    let names: Vec<&str> = scenario
        .processing_stages
        .iter()
        .map(|s| s.stage_name.as_str())
        .filter(|n| !n.trim().is_empty())
        .collect();
    let mut seen_names = HashSet::new();
    let mut seen_orders: HashMap<i64, &str> = HashMap::new();

    for (i, stage) in scenario.processing_stages.iter().enumerate() {
        let path = format!("processing-stages[{i}]");
        let name = stage.stage_name.trim();

        if name.is_empty() {
            result.error(format!("{path}.stage-name"), "stage-name must not be empty");
        } else if !seen_names.insert(name) {
            result.error(format!("{path}.stage-name"), format!("duplicate stage-name '{name}'"));
        }

        if stage.config_file.trim().is_empty() {
            result.error(format!("{path}.config-file"), format!("stage '{name}' has no config-file"));
        }

        if stage.execution_order <= 0 {
            result.error(
                format!("{path}.execution-order"),
                format!("execution-order must be a positive integer, got {}", stage.execution_order),
            );
        } else if let Some(other) = seen_orders.insert(stage.execution_order, name) {
            result.error(
                format!("{path}.execution-order"),
                format!(
                    "execution-order {} is already used by stage '{other}'",
                    stage.execution_order
                ),
            );
        }

        if let Some(policy) = &stage.failure_policy {
            if policy.parse::<FailurePolicy>().is_err() {
                let valid = FailurePolicy::names();
                let message = format!("unknown failure-policy '{policy}'");
                match fuzzy_match(policy, &valid) {
                    Some(s) => result.error_with_suggestion(
                        format!("{path}.failure-policy"),
                        message,
                        format!("did you mean '{s}'?"),
                    ),
                    None => result.error(
                        format!("{path}.failure-policy"),
                        format!("{message}; expected one of: {}", valid.join(", ")),
                    ),
                }
            }
        }

        for dep in &stage.depends_on {
            let dep_path = format!("{path}.depends-on");
            // self-dependencies surface as a cycle below
            if dep == name {
                continue;
            }
            match scenario.stage(dep) {
                None => {
                    let message = format!("stage '{name}' depends on unknown stage '{dep}'");
                    match fuzzy_match(dep, &names) {
                        Some(s) => result.error_with_suggestion(dep_path, message, format!("did you mean '{s}'?")),
                        None => result.error(dep_path, message),
                    }
                }
                Some(target) if target.execution_order >= stage.execution_order && stage.execution_order > 0 => {
                    result.warn(
                        dep_path,
                        format!(
                            "stage '{name}' (order {}) depends on '{dep}' (order {}); dependency order takes precedence",
                            stage.execution_order, target.execution_order
                        ),
                    );
                }
                Some(_) => {}
            }
        }
    }

    let graph = dependency_graph(scenario);
    if let Some(cycle) = find_cycles(&graph, true).into_iter().next() {
        let start = cycle.first().cloned().unwrap_or_default();
        result.error(
            "processing-stages",
            format!(
                "Circular dependency detected involving stage '{start}': {}",
                cycle.join(" -> ")
            ),
        );
    }

    result
}

/// Stages in the order they run: dependencies first, execution-order
/// breaking ties. Errors when the scenario does not validate.
pub fn execution_plan(scenario: &ScenarioConfiguration) -> Result<Vec<&ProcessingStage>, ValidationResult> {
    let validation = validate_scenario(scenario);
    if !validation.is_valid() {
        return Err(validation);
    }
    let graph = dependency_graph(scenario);
    let order = topological_order(&graph).map_err(|stuck| {
        let mut result = ValidationResult::new();
        result.error(
            "processing-stages",
            format!("stages cannot be ordered: {}", stuck.join(", ")),
        );
        result
    })?;
    Ok(order.iter().filter_map(|name| scenario.stage(name)).collect())
}

/// `stage -> depends-on` in execution-order, so ready stages run in that order.
fn dependency_graph(scenario: &ScenarioConfiguration) -> IndexMap<String, Vec<String>> {
    scenario
        .stages_by_execution_order()
        .into_iter()
        .filter(|s| !s.stage_name.trim().is_empty())
        .map(|s| (s.stage_name.clone(), s.depends_on.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, order: i64) -> ProcessingStage {
        ProcessingStage::new(name, format!("{name}.yaml"), order)
    }

    fn swap() -> ScenarioConfiguration {
        ScenarioConfiguration::new("swap-processing")
            .with_data_type("Swap")
            .with_stage(stage("basic-validation", 1).with_policy(FailurePolicy::Terminate))
            .with_stage(stage("enrichment", 2).depends_on("basic-validation"))
            .with_stage(stage("risk", 3).depends_on("enrichment").optional())
            .with_stage(stage("limits", 4).depends_on("basic-validation"))
    }

    #[test]
    fn valid_dag_has_no_findings_and_a_stable_plan() {
        let scenario = swap();
        let result = validate_scenario(&scenario);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());

        let plan: Vec<_> = execution_plan(&scenario)
            .unwrap()
            .iter()
            .map(|s| s.stage_name.as_str())
            .collect();
        assert_eq!(plan, vec!["basic-validation", "enrichment", "risk", "limits"]);
    }

    #[test]
    fn revalidation_is_idempotent() {
        let scenario = swap().with_stage(stage("late", 9).depends_on("risk"));
        assert_eq!(validate_scenario(&scenario), validate_scenario(&scenario));
    }

    #[test]
    fn cycle_reported_once_and_blocks_plan() {
        let scenario = ScenarioConfiguration::new("s")
            .with_stage(stage("a", 1).depends_on("c"))
            .with_stage(stage("b", 2).depends_on("a"))
            .with_stage(stage("c", 3).depends_on("b"))
            .with_stage(stage("d", 4).depends_on("e"))
            .with_stage(stage("e", 5).depends_on("d"));
        let result = validate_scenario(&scenario);
        let cycles: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.message.starts_with("Circular dependency"))
            .collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].message.contains("'a'"), "{}", cycles[0].message);
        assert!(execution_plan(&scenario).is_err());
    }

    #[test]
    fn self_dependency_is_a_single_cycle() {
        let scenario = ScenarioConfiguration::new("s")
            .with_stage(stage("a", 1).depends_on("a"))
            .with_stage(stage("b", 2));
        let result = validate_scenario(&scenario);
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(
            result.errors[0].message,
            "Circular dependency detected involving stage 'a': a -> a"
        );
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn stage_level_errors_are_collected() {
        let mut scenario = ScenarioConfiguration::new("s")
            .with_stage(stage("a", 1))
            .with_stage(stage("a", 1))
            .with_stage(stage("b", 0).depends_on("missing"))
            .with_stage(stage("", 3));
        scenario.processing_stages[0].failure_policy = Some("terminte".into());
        scenario.processing_stages[3].config_file.clear();

        let result = validate_scenario(&scenario);
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "processing-stages[0].failure-policy",
                "processing-stages[1].stage-name",
                "processing-stages[1].execution-order",
                "processing-stages[2].execution-order",
                "processing-stages[2].depends-on",
                "processing-stages[3].stage-name",
                "processing-stages[3].config-file",
            ]
        );
        assert_eq!(result.errors[0].suggestion.as_deref(), Some("did you mean 'terminate'?"));
    }

    #[test]
    fn unknown_dependency_gets_suggestion() {
        let scenario = ScenarioConfiguration::new("s")
            .with_stage(stage("basic-validation", 1))
            .with_stage(stage("enrichment", 2).depends_on("basic-validaton"));
        let result = validate_scenario(&scenario);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].suggestion.as_deref(), Some("did you mean 'basic-validation'?"));
    }

    #[test]
    fn stages_and_legacy_list_is_a_warning() {
        let mut scenario = swap();
        scenario.rule_configurations.push("legacy.yaml".into());
        let result = validate_scenario(&scenario);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].path, "rule-configurations");
    }

    #[test]
    fn dependency_order_overrides_execution_order() {
        let scenario = ScenarioConfiguration::new("s")
            .with_stage(stage("report", 1).depends_on("load"))
            .with_stage(stage("load", 2));
        let result = validate_scenario(&scenario);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        let plan: Vec<_> = execution_plan(&scenario)
            .unwrap()
            .iter()
            .map(|s| s.stage_name.as_str())
            .collect();
        assert_eq!(plan, vec!["load", "report"]);
    }
}
