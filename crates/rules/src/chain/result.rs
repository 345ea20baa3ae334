//! Aggregate outcome of one chain execution.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use super::context::ChainContext;
use super::model::{ChainPattern, RuleChain};
use crate::engine::RuleResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainResult {
    pub chain_id: String,
    pub chain_name: String,
    pub pattern: ChainPattern,
    pub successful: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Intermediate values recorded during execution, in write order.
    pub stage_results: IndexMap<String, Value>,
    pub executed_rules: Vec<RuleResult>,
    pub execution_path: Vec<String>,
    pub elapsed_micros: u64,
    pub timestamp: DateTime<Utc>,
}

impl ChainResult {
    pub fn new(chain: &RuleChain) -> Self {
        Self {
            chain_id: chain.id.clone(),
            chain_name: chain.display_name().to_string(),
            pattern: chain.pattern,
            successful: false,
            final_outcome: None,
            error_message: None,
            stage_results: IndexMap::new(),
            executed_rules: Vec::new(),
            execution_path: Vec::new(),
            elapsed_micros: 0,
            timestamp: Utc::now(),
        }
    }

    /// Record a value in both the result and the context.
    pub fn record(&mut self, ctx: &mut ChainContext, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        ctx.set_stage_result(key.clone(), value.clone());
        self.stage_results.insert(key, value);
    }

    pub fn succeed(mut self, outcome: impl Into<String>) -> Self {
        self.successful = true;
        self.final_outcome = Some(outcome.into());
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.successful = false;
        self.error_message = Some(message.into());
        self
    }

    /// Copy the context's execution path into the result.
    pub fn with_path(mut self, ctx: &ChainContext) -> Self {
        self.execution_path = ctx.execution_path().to_vec();
        self
    }

    pub fn stage_result(&self, key: &str) -> Option<&Value> {
        self.stage_results.get(key)
    }

    pub fn triggered_count(&self) -> usize {
        self.executed_rules.iter().filter(|r| r.is_triggered()).count()
    }
}
