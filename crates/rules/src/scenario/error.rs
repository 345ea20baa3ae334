use std::path::PathBuf;

use crate::loader::RuleError;

/// Failures at the scenario service's load and routing boundaries.
///
/// Execution problems are not errors: they are reported through
/// [`ScenarioExecutionResult`](super::ScenarioExecutionResult).
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: RuleError,
    },

    #[error("routing failed: {0}")]
    Routing(String),

    #[error("scenario '{scenario_id}' is invalid: {}", errors.join("; "))]
    Validation { scenario_id: String, errors: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ScenarioError>;
