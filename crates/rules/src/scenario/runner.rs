//! [`StageRunner`]: executes a scenario's stages in dependency order.

use std::sync::Arc;
use std::time::Instant;

use rulekit_core::FieldAccessor;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::model::{FailurePolicy, ProcessingStage, ScenarioConfiguration};
use super::result::{ScenarioExecutionResult, StageExecutionResult, StageOutcome};
use super::validator::{execution_plan, validate_scenario};
use crate::chain::{ChainContext, RuleChainExecutor};
use crate::engine::RuleEngine;
use crate::enrichment::EnrichmentProcessor;
use crate::expression::Bindings;
use crate::loader::DocumentLoader;
use crate::schema::RuleConfigBody;

const TERMINATED_REASON: &str = "Scenario terminated due to previous stage failure";

/// Runs stages sequentially in topological order.
///
/// Each stage loads its rule-config document, applies its enrichments to the
/// record, evaluates its rules and rule chains, and then the stage's failure
/// policy decides whether later stages run.
pub struct StageRunner {
    engine: Arc<RuleEngine>,
    chains: RuleChainExecutor,
    enrichment: Arc<EnrichmentProcessor>,
    loader: Arc<DocumentLoader>,
}

impl StageRunner {
    pub fn new(engine: Arc<RuleEngine>, enrichment: Arc<EnrichmentProcessor>, loader: Arc<DocumentLoader>) -> Self {
        Self {
            chains: RuleChainExecutor::new(Arc::clone(&engine)),
            engine,
            enrichment,
            loader,
        }
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        &self.engine
    }

    pub fn enrichment(&self) -> &Arc<EnrichmentProcessor> {
        &self.enrichment
    }

    /// Validate `scenario`, then run its stages (or legacy rule configs) over `record`.
    ///
    /// An invalid scenario runs nothing and finishes as FAILED with the
    /// validation errors attached.
    pub fn execute(&self, scenario: &ScenarioConfiguration, record: &mut dyn FieldAccessor) -> ScenarioExecutionResult {
        let mut result = ScenarioExecutionResult::new(&scenario.scenario_id, Value::Null);

        let validation = validate_scenario(scenario);
        for warning in validation.warning_messages() {
            warn!(scenario_id = %scenario.scenario_id, warning = %warning, "scenario validation warning");
        }
        if !validation.is_valid() {
            error!(
                scenario_id = %scenario.scenario_id,
                errors = ?validation.error_messages(),
                "scenario failed validation, no stages executed"
            );
            result.validation_errors = validation.error_messages();
            result.data = record.to_value();
            return result.finish();
        }

        let stages: Vec<ProcessingStage> = if scenario.has_stage_configuration() {
            match execution_plan(scenario) {
                Ok(plan) => plan.into_iter().cloned().collect(),
                Err(invalid) => {
                    result.validation_errors = invalid.error_messages();
                    result.data = record.to_value();
                    return result.finish();
                }
            }
        } else {
            legacy_stages(scenario)
        };

        info!(scenario_id = %scenario.scenario_id, stages = stages.len(), "executing scenario");
        for stage in &stages {
            let failed_deps: Vec<&str> = stage
                .depends_on
                .iter()
                .filter(|dep| !result.stage(dep).is_some_and(StageExecutionResult::is_success))
                .map(String::as_str)
                .collect();
            if !failed_deps.is_empty() {
                let reason = format!("Failed dependencies: {}", failed_deps.join(", "));
                info!(stage = %stage.stage_name, reason = %reason, "skipping stage");
                result.skipped_stages.insert(stage.stage_name.clone(), reason);
                continue;
            }
            if result.terminated_by.is_some() {
                result
                    .skipped_stages
                    .insert(stage.stage_name.clone(), TERMINATED_REASON.to_string());
                continue;
            }

            let stage_result = self.run_stage(scenario, stage, record, &result);
            info!(
                stage = %stage.stage_name,
                outcome = ?stage_result.outcome,
                elapsed_us = stage_result.elapsed_micros,
                "stage completed"
            );
            if !stage_result.is_success() {
                apply_failure_policy(stage, &stage_result, &mut result);
            }
            result.stage_results.push(stage_result);
        }

        result.data = record.to_value();
        let result = result.finish();
        info!(
            scenario_id = %result.scenario_id,
            execution_id = %result.execution_id,
            status = %result.status,
            executed = result.stage_results.len(),
            skipped = result.skipped_stages.len(),
            elapsed_us = result.elapsed_micros,
            "scenario execution completed"
        );
        result
    }

    fn run_stage(
        &self,
        scenario: &ScenarioConfiguration,
        stage: &ProcessingStage,
        record: &mut dyn FieldAccessor,
        progress: &ScenarioExecutionResult,
    ) -> StageExecutionResult {
        let started = Instant::now();
        let mut stage_result = StageExecutionResult::new(&stage.stage_name, stage.policy());
        let path = scenario.resolve(&stage.config_file);
        debug!(stage = %stage.stage_name, config = %path.display(), "executing stage");

        let document = match self.loader.load(&path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(stage = %stage.stage_name, path = %path.display(), error = %e, "stage configuration failed to load");
                return finish_stage(
                    stage_result.with_outcome(
                        StageOutcome::ConfigurationError,
                        format!("Failed to load {}: {}", path.display(), e),
                    ),
                    started,
                );
            }
        };
        let Some(body) = document.as_rule_config() else {
            return finish_stage(
                stage_result.with_outcome(
                    StageOutcome::ConfigurationError,
                    format!("{} is a {} document, expected rule-config", path.display(), document.metadata.doc_type),
                ),
                started,
            );
        };

        match self.evaluate_stage(body, record, progress, &mut stage_result) {
            Ok(()) if stage_result.failures.is_empty() => {
                let message = format!("{} rules evaluated", stage_result.rule_results.len());
                finish_stage(stage_result.with_outcome(StageOutcome::Success, message), started)
            }
            Ok(()) => {
                let outcome = if stage.required {
                    StageOutcome::CriticalFailure
                } else {
                    StageOutcome::NonCriticalFailure
                };
                let message = format!("Stage execution failed: {}", stage_result.failures.join(", "));
                finish_stage(stage_result.with_outcome(outcome, message), started)
            }
            Err(message) if stage.required => {
                finish_stage(stage_result.with_outcome(StageOutcome::ConfigurationError, message), started)
            }
            Err(message) => {
                warn!(stage = %stage.stage_name, error = %message, "optional stage failed to evaluate");
                finish_stage(stage_result.with_outcome(StageOutcome::Failure, message), started)
            }
        }
    }

    /// Enrich, then evaluate rules and chains, recording into `stage_result`.
    fn evaluate_stage(
        &self,
        body: &RuleConfigBody,
        record: &mut dyn FieldAccessor,
        progress: &ScenarioExecutionResult,
        stage_result: &mut StageExecutionResult,
    ) -> Result<(), String> {
        let rule_set = body.rule_set().map_err(|e| e.to_string())?;

        if !body.enrichments.is_empty() {
            let enriched = self.enrichment.process_with_result(&body.enrichments, record);
            for (id, message) in &enriched.failed {
                stage_result.warnings.push(format!("enrichment '{id}' failed: {message}"));
            }
            if !enriched.missing_required_fields.is_empty() {
                stage_result.failures.push(format!(
                    "Required field enrichment failed: {}",
                    enriched.missing_required_fields.join(", ")
                ));
            }
        }

        let bindings = stage_bindings(record, progress);
        let outcome = self.engine.evaluate_rule_set(&rule_set, &bindings);
        stage_result.rule_results = outcome.results;
        stage_result.failures.extend(outcome.failures);
        stage_result.warnings.extend(outcome.warnings);

        if !body.rule_chains.is_empty() {
            let mut ctx = ChainContext::from_bindings(bindings);
            for chain in self.chains.execute_all(&body.rule_chains, &mut ctx) {
                if chain.successful {
                    let value = chain.final_outcome.clone().map(Value::String).unwrap_or(Value::Null);
                    stage_result.outputs.insert(chain.chain_id.clone(), value);
                } else {
                    stage_result.failures.push(format!(
                        "chain '{}' failed: {}",
                        chain.chain_id,
                        chain.error_message.as_deref().unwrap_or("unknown error")
                    ));
                }
                stage_result.chain_results.push(chain);
            }
        }
        Ok(())
    }
}

/// Bindings for one stage: the record as `data`, run identifiers, and the
/// outputs of earlier successful stages as `{stage}_{key}`.
fn stage_bindings(record: &dyn FieldAccessor, progress: &ScenarioExecutionResult) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert("data".into(), record.to_value());
    bindings.insert("scenarioId".into(), Value::String(progress.scenario_id.clone()));
    bindings.insert("executionStartTime".into(), Value::String(progress.started_at.to_rfc3339()));
    for stage in progress.stage_results.iter().filter(|s| s.is_success()) {
        for (key, value) in &stage.outputs {
            bindings.insert(format!("{}_{}", stage.stage_name, key), value.clone());
        }
    }
    bindings
}

fn apply_failure_policy(stage: &ProcessingStage, stage_result: &StageExecutionResult, result: &mut ScenarioExecutionResult) {
    let message = stage_result.message.as_deref().unwrap_or("stage failed");
    match stage.policy() {
        FailurePolicy::Terminate => {
            error!(stage = %stage.stage_name, "stage failed, terminating scenario");
            result.terminated_by = Some(stage.stage_name.clone());
        }
        FailurePolicy::ContinueWithWarnings => {
            warn!(stage = %stage.stage_name, "stage failed, continuing with warnings");
            result.warnings.push(format!(
                "Stage '{}' failed but processing continued: {}",
                stage.stage_name, message
            ));
        }
        FailurePolicy::FlagForReview => {
            warn!(stage = %stage.stage_name, "stage failed, flagging for review");
            result.review_flags.push(format!(
                "Stage '{}' requires manual review: {}",
                stage.stage_name, message
            ));
        }
    }
}

/// Legacy rule-config lists run as independent optional stages.
fn legacy_stages(scenario: &ScenarioConfiguration) -> Vec<ProcessingStage> {
    scenario
        .rule_configurations
        .iter()
        .enumerate()
        .map(|(i, file)| ProcessingStage::new(format!("legacy-{i}"), file.clone(), i as i64 + 1).optional())
        .collect()
}

fn finish_stage(mut stage_result: StageExecutionResult, started: Instant) -> StageExecutionResult {
    stage_result.elapsed_micros = started.elapsed().as_micros() as u64;
    stage_result
}
