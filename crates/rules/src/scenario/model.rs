//! Scenario, stage and registry definitions as written in documents.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::default_true;

// ── Failure policy ──────────────────────────────────────────────────

/// What happens to the scenario when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the scenario; remaining stages are skipped.
    Terminate,
    /// Record a warning and keep going.
    ContinueWithWarnings,
    /// Mark the scenario for manual review and keep going.
    FlagForReview,
}

impl FailurePolicy {
    pub const ALL: [FailurePolicy; 3] = [
        FailurePolicy::Terminate,
        FailurePolicy::ContinueWithWarnings,
        FailurePolicy::FlagForReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Terminate => "terminate",
            FailurePolicy::ContinueWithWarnings => "continue-with-warnings",
            FailurePolicy::FlagForReview => "flag-for-review",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(FailurePolicy::as_str).collect()
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown failure policy: '{}'", s))
    }
}

// ── Processing stage ────────────────────────────────────────────────

/// One stage of a scenario's processing DAG.
///
/// Fields are kept close to the wire so that the validator, not serde,
/// reports bad orders and unknown policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProcessingStage {
    #[serde(default)]
    pub stage_name: String,
    #[serde(default)]
    pub config_file: String,
    #[serde(default)]
    pub execution_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub stage_metadata: IndexMap<String, Value>,
}

impl ProcessingStage {
    pub fn new(name: impl Into<String>, config_file: impl Into<String>, execution_order: i64) -> Self {
        Self {
            stage_name: name.into(),
            config_file: config_file.into(),
            execution_order,
            failure_policy: None,
            depends_on: Vec::new(),
            required: true,
            stage_metadata: IndexMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy.as_str().to_string());
        self
    }

    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.depends_on.push(stage.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Effective failure policy.
    ///
    /// Absent: `terminate` for required stages, `continue-with-warnings` for
    /// optional ones. Unrecognized values (rejected by validation) terminate.
    pub fn policy(&self) -> FailurePolicy {
        match &self.failure_policy {
            Some(p) => p.parse().unwrap_or(FailurePolicy::Terminate),
            None if self.required => FailurePolicy::Terminate,
            None => FailurePolicy::ContinueWithWarnings,
        }
    }
}

// ── Scenario ────────────────────────────────────────────────────────

/// Condition that claims a record for a scenario when no data-type mapping applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassificationRule {
    pub condition: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-data-type processing specification: a stage DAG or a legacy
/// flat list of rule-config files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioConfiguration {
    pub scenario_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub classification_rule: Option<ClassificationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_configurations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_stages: Vec<ProcessingStage>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
    /// Directory relative config-file references resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl ScenarioConfiguration {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        let scenario_id = scenario_id.into();
        Self {
            name: scenario_id.clone(),
            scenario_id,
            ..Default::default()
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_types.push(data_type.into());
        self
    }

    pub fn with_stage(mut self, stage: ProcessingStage) -> Self {
        self.processing_stages.push(stage);
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn has_stage_configuration(&self) -> bool {
        !self.processing_stages.is_empty()
    }

    /// Legacy rule-config list only; stages win when both are present.
    pub fn is_legacy_configuration(&self) -> bool {
        !self.has_stage_configuration() && !self.rule_configurations.is_empty()
    }

    /// Stages sorted by execution order (stable).
    pub fn stages_by_execution_order(&self) -> Vec<&ProcessingStage> {
        let mut stages: Vec<&ProcessingStage> = self.processing_stages.iter().collect();
        stages.sort_by_key(|s| s.execution_order);
        stages
    }

    pub fn stage(&self, name: &str) -> Option<&ProcessingStage> {
        self.processing_stages.iter().find(|s| s.stage_name == name)
    }

    /// Exact match, or a fully-qualified name ending in `.{data_type}`.
    pub fn applies_to_data_type(&self, data_type: &str) -> bool {
        self.data_types
            .iter()
            .any(|t| t == data_type || simple_name(t) == simple_name(data_type))
    }

    pub fn business_domain(&self) -> Option<&str> {
        self.metadata.get("business-domain").and_then(Value::as_str)
    }

    pub fn owner(&self) -> Option<&str> {
        self.metadata.get("owner").and_then(Value::as_str)
    }

    pub fn processing_sla_ms(&self) -> Option<u64> {
        self.metadata.get("processing-sla-ms").and_then(Value::as_u64)
    }

    /// Resolve a config-file reference against the scenario's directory.
    pub fn resolve(&self, config_file: &str) -> PathBuf {
        resolve_relative(self.base_dir.as_deref(), config_file)
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Join `reference` onto `base` unless it is absolute or only exists as given.
pub(crate) fn resolve_relative(base: Option<&Path>, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    match base {
        Some(base) if path.is_relative() => {
            let joined = base.join(path);
            if joined.exists() || !path.exists() {
                joined
            } else {
                path.to_path_buf()
            }
        }
        _ => path.to_path_buf(),
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// One scenario listed in a scenario-registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryEntry {
    #[serde(default)]
    pub scenario_id: String,
    #[serde(default)]
    pub config_file: String,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub business_domain: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Ordered condition rules plus a fallback scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingConfig {
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub default_scenario: Option<String>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoutingRule {
    pub condition: String,
    pub target_scenario: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_depend_on_required() {
        let required = ProcessingStage::new("a", "a.yaml", 1);
        assert_eq!(required.policy(), FailurePolicy::Terminate);
        assert_eq!(required.clone().optional().policy(), FailurePolicy::ContinueWithWarnings);
        assert_eq!(
            required.with_policy(FailurePolicy::FlagForReview).policy(),
            FailurePolicy::FlagForReview
        );
    }

    #[test]
    fn stages_sorted_by_order() {
        let scenario = ScenarioConfiguration::new("s")
            .with_stage(ProcessingStage::new("late", "b.yaml", 5))
            .with_stage(ProcessingStage::new("early", "a.yaml", 1));
        let names: Vec<_> = scenario
            .stages_by_execution_order()
            .iter()
            .map(|s| s.stage_name.as_str())
            .collect();
        assert_eq!(names, vec!["early", "late"]);
        assert!(scenario.has_stage_configuration());
        assert!(!scenario.is_legacy_configuration());
    }

    #[test]
    fn data_type_matching_accepts_qualified_names() {
        let scenario = ScenarioConfiguration::new("s").with_data_type("com.example.trade.Swap");
        assert!(scenario.applies_to_data_type("Swap"));
        assert!(scenario.applies_to_data_type("com.example.trade.Swap"));
        assert!(!scenario.applies_to_data_type("Bond"));
    }

    #[test]
    fn resolve_against_base_dir() {
        let scenario = ScenarioConfiguration::new("s").with_base_dir("/configs/scenarios");
        assert_eq!(scenario.resolve("rules/a.yaml"), PathBuf::from("/configs/scenarios/rules/a.yaml"));
        assert_eq!(scenario.resolve("/abs/b.yaml"), PathBuf::from("/abs/b.yaml"));
    }

    #[test]
    fn unknown_policy_parses_to_error() {
        assert!("halt".parse::<FailurePolicy>().is_err());
        assert_eq!("flag-for-review".parse::<FailurePolicy>().unwrap(), FailurePolicy::FlagForReview);
    }
}
