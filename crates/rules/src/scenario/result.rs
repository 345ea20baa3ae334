//! Stage and scenario execution results.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::model::FailurePolicy;
use crate::chain::ChainResult;
use crate::engine::RuleResult;

/// How one stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    Success,
    /// Rules failed and the stage's policy decides what happens next.
    Failure,
    /// The stage's config file could not be loaded or is not a rule config.
    ConfigurationError,
    /// A required stage failed.
    CriticalFailure,
    /// An optional stage failed.
    NonCriticalFailure,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }
}

/// Outcome of one processing stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageExecutionResult {
    pub stage_name: String,
    pub outcome: StageOutcome,
    pub failure_policy: FailurePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_micros: u64,
    pub rule_results: Vec<RuleResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chain_results: Vec<ChainResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Values this stage exposes to later stages as `{stage}_{key}`.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Value>,
}

impl StageExecutionResult {
    pub fn new(stage_name: impl Into<String>, failure_policy: FailurePolicy) -> Self {
        Self {
            stage_name: stage_name.into(),
            outcome: StageOutcome::Success,
            failure_policy,
            message: None,
            started_at: Utc::now(),
            elapsed_micros: 0,
            rule_results: Vec::new(),
            chain_results: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn with_outcome(mut self, outcome: StageOutcome, message: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.message = Some(message.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Overall status of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Successful,
    PartialSuccess,
    RequiresReview,
    Terminated,
    Failed,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Successful => "SUCCESSFUL",
            ScenarioStatus::PartialSuccess => "PARTIAL_SUCCESS",
            ScenarioStatus::RequiresReview => "REQUIRES_REVIEW",
            ScenarioStatus::Terminated => "TERMINATED",
            ScenarioStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated outcome of running one record through a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioExecutionResult {
    pub execution_id: Uuid,
    pub scenario_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    pub status: ScenarioStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_micros: u64,
    pub stage_results: Vec<StageExecutionResult>,
    /// Stage name → reason it did not run.
    pub skipped_stages: IndexMap<String, String>,
    pub warnings: Vec<String>,
    pub review_flags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<String>,
    /// The record after enrichments applied by the stages.
    pub data: Value,
}

impl ScenarioExecutionResult {
    pub fn new(scenario_id: impl Into<String>, data: Value) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            scenario_id: scenario_id.into(),
            data_type: None,
            status: ScenarioStatus::Successful,
            started_at: Utc::now(),
            completed_at: None,
            elapsed_micros: 0,
            stage_results: Vec::new(),
            skipped_stages: IndexMap::new(),
            warnings: Vec::new(),
            review_flags: Vec::new(),
            validation_errors: Vec::new(),
            terminated_by: None,
            data,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageExecutionResult> {
        self.stage_results.iter().find(|s| s.stage_name == name)
    }

    pub fn executed_stages(&self) -> Vec<&str> {
        self.stage_results.iter().map(|s| s.stage_name.as_str()).collect()
    }

    pub fn is_successful(&self) -> bool {
        self.status == ScenarioStatus::Successful
    }

    pub fn was_skipped(&self, stage: &str) -> bool {
        self.skipped_stages.contains_key(stage)
    }

    /// Derive the status from what was recorded.
    ///
    /// Validation errors fail the run outright; then termination, review
    /// flags, clean success and warnings-only, in that order.
    pub fn derive_status(&self) -> ScenarioStatus {
        if !self.validation_errors.is_empty() {
            ScenarioStatus::Failed
        } else if self.terminated_by.is_some() {
            ScenarioStatus::Terminated
        } else if !self.review_flags.is_empty() {
            ScenarioStatus::RequiresReview
        } else if self.stage_results.iter().all(StageExecutionResult::is_success) && self.warnings.is_empty() {
            ScenarioStatus::Successful
        } else if self.stage_results.iter().all(|s| {
            s.is_success() || s.failure_policy == FailurePolicy::ContinueWithWarnings
        }) {
            ScenarioStatus::PartialSuccess
        } else {
            ScenarioStatus::Failed
        }
    }

    /// Stamp completion time and status.
    pub fn finish(mut self) -> Self {
        let completed = Utc::now();
        self.elapsed_micros = (completed - self.started_at).num_microseconds().unwrap_or(0).max(0) as u64;
        self.completed_at = Some(completed);
        self.status = self.derive_status();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failed(name: &str, policy: FailurePolicy) -> StageExecutionResult {
        StageExecutionResult::new(name, policy).with_outcome(StageOutcome::CriticalFailure, "boom")
    }

    #[test]
    fn status_precedence() {
        let mut result = ScenarioExecutionResult::new("s", json!({}));
        result.stage_results.push(StageExecutionResult::new("ok", FailurePolicy::Terminate));
        assert_eq!(result.derive_status(), ScenarioStatus::Successful);

        result.warnings.push("optional stage failed".into());
        result
            .stage_results
            .push(failed("optional", FailurePolicy::ContinueWithWarnings));
        assert_eq!(result.derive_status(), ScenarioStatus::PartialSuccess);

        result.review_flags.push("review".into());
        assert_eq!(result.derive_status(), ScenarioStatus::RequiresReview);

        result.terminated_by = Some("ok".into());
        assert_eq!(result.derive_status(), ScenarioStatus::Terminated);

        result.validation_errors.push("cycle".into());
        assert_eq!(result.derive_status(), ScenarioStatus::Failed);
    }

    #[test]
    fn finish_stamps_completion() {
        let result = ScenarioExecutionResult::new("s", json!({})).finish();
        assert!(result.completed_at.is_some());
        assert_eq!(result.status, ScenarioStatus::Successful);
        assert_eq!(serde_json::to_value(&result).unwrap()["status"], json!("SUCCESSFUL"));
    }
}
