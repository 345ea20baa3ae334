//! Pattern executor contract and the [`RuleChainExecutor`] dispatcher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::accumulative::AccumulativeChainingExecutor;
use super::conditional::ConditionalChainingExecutor;
use super::context::ChainContext;
use super::fluent::FluentBuilderExecutor;
use super::model::{ChainPattern, RuleChain};
use super::result::ChainResult;
use super::routing::ResultBasedRoutingExecutor;
use super::sequential::SequentialDependencyExecutor;
use super::workflow::ComplexWorkflowExecutor;
use crate::engine::{Rule, RuleEngine, RuleResult};
use crate::expression::{is_truthy, ExpressionError};
use crate::validation::ValidationResult;

/// One chain composition strategy.
pub trait PatternExecutor: Send + Sync {
    fn pattern(&self) -> ChainPattern;

    /// Structural check of a chain's configuration with actionable diagnostics.
    fn validate_configuration(&self, configuration: &Value) -> ValidationResult;

    /// Run the chain against `ctx`, writing intermediate values back into it.
    fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult;
}

/// Engine access shared by every pattern executor.
#[derive(Clone)]
pub struct PatternSupport {
    engine: Arc<RuleEngine>,
}

impl PatternSupport {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Evaluate an expression against the context's current bindings.
    pub fn evaluate(&self, expression: &str, ctx: &ChainContext) -> Result<Value, ExpressionError> {
        self.engine.evaluate(expression, &ctx.bindings())
    }

    pub fn evaluate_condition(&self, expression: &str, ctx: &ChainContext) -> Result<bool, ExpressionError> {
        self.evaluate(expression, ctx).map(|v| is_truthy(&v))
    }

    /// Run a rule through the engine and keep its result for the audit trail.
    pub fn execute_rule(&self, rule: &Rule, ctx: &ChainContext, result: &mut ChainResult) -> RuleResult {
        let outcome = self.engine.execute_rule(rule, &ctx.bindings());
        result.executed_rules.push(outcome.clone());
        outcome
    }
}

/// Deserialize a chain configuration into its typed form.
pub(crate) fn parse_config<T: DeserializeOwned>(configuration: &Value) -> Result<T, String> {
    if !configuration.is_object() {
        return Err("configuration must be a mapping".to_string());
    }
    serde_json::from_value(configuration.clone()).map_err(|e| e.to_string())
}

/// Shared prologue: parse the configuration or produce a failed result.
pub(crate) fn parse_or_fail<T: DeserializeOwned>(chain: &RuleChain) -> Result<T, ChainResult> {
    parse_config(&chain.configuration).map_err(|e| {
        ChainResult::new(chain).fail(format!("Invalid {} configuration: {}", chain.pattern, e))
    })
}

/// Validation result for a configuration that failed to deserialize.
pub(crate) fn invalid_shape(error: String) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.error("configuration", error);
    result
}

/// Dispatches chains to the executor registered for their pattern.
pub struct RuleChainExecutor {
    executors: HashMap<ChainPattern, Box<dyn PatternExecutor>>,
}

impl RuleChainExecutor {
    /// Executor with all six built-in patterns registered.
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        let support = PatternSupport::new(engine);
        let mut executor = Self {
            executors: HashMap::new(),
        };
        executor.register(Box::new(ConditionalChainingExecutor::new(support.clone())));
        executor.register(Box::new(SequentialDependencyExecutor::new(support.clone())));
        executor.register(Box::new(ResultBasedRoutingExecutor::new(support.clone())));
        executor.register(Box::new(AccumulativeChainingExecutor::new(support.clone())));
        executor.register(Box::new(ComplexWorkflowExecutor::new(support.clone())));
        executor.register(Box::new(FluentBuilderExecutor::new(support)));
        executor
    }

    /// Register (or replace) the executor for its pattern.
    pub fn register(&mut self, executor: Box<dyn PatternExecutor>) {
        self.executors.insert(executor.pattern(), executor);
    }

    /// Validate a chain's configuration without running it.
    pub fn validate(&self, chain: &RuleChain) -> ValidationResult {
        match self.executors.get(&chain.pattern) {
            Some(executor) => executor.validate_configuration(&chain.configuration),
            None => {
                let mut result = ValidationResult::new();
                result.error("pattern", format!("no executor registered for pattern '{}'", chain.pattern));
                result
            }
        }
    }

    /// Validate then run one chain.
    pub fn execute(&self, chain: &RuleChain, ctx: &mut ChainContext) -> ChainResult {
        if !chain.enabled {
            debug!(chain_id = %chain.id, "rule chain disabled");
            return ChainResult::new(chain).fail(format!("Rule chain '{}' is disabled", chain.id));
        }
        let Some(executor) = self.executors.get(&chain.pattern) else {
            return ChainResult::new(chain).fail(format!("Unsupported pattern '{}'", chain.pattern));
        };

        let validation = executor.validate_configuration(&chain.configuration);
        if !validation.is_valid() {
            warn!(chain_id = %chain.id, pattern = %chain.pattern, errors = ?validation.error_messages(), "invalid rule chain configuration");
            return ChainResult::new(chain).fail(format!(
                "Invalid {} configuration: {}",
                chain.pattern,
                validation.error_messages().join("; ")
            ));
        }

        let started = Instant::now();
        let mut result = executor.execute(chain, ctx);
        result.elapsed_micros = started.elapsed().as_micros() as u64;
        info!(
            chain_id = %chain.id,
            pattern = %chain.pattern,
            successful = result.successful,
            outcome = ?result.final_outcome,
            elapsed_us = result.elapsed_micros,
            "rule chain executed"
        );
        result
    }

    /// Run every enabled chain in ascending priority order against one context.
    pub fn execute_all(&self, chains: &[RuleChain], ctx: &mut ChainContext) -> Vec<ChainResult> {
        let mut ordered: Vec<&RuleChain> = chains.iter().filter(|c| c.enabled).collect();
        ordered.sort_by_key(|c| c.priority);
        ordered.into_iter().map(|chain| self.execute(chain, ctx)).collect()
    }
}
