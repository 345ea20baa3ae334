//! Rule chains: multi-step compositions of rules.
//!
//! A chain names one of six patterns and carries a free-form configuration
//! block interpreted by that pattern's executor. [`RuleChainExecutor`]
//! validates the configuration and dispatches to the right executor; every
//! executor threads a [`ChainContext`] through its steps and reports a
//! [`ChainResult`].

mod accumulative;
mod conditional;
mod context;
mod executor;
mod fluent;
mod model;
mod result;
mod routing;
mod sequential;
mod workflow;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use accumulative::{
    priority_rank, select_rules, AccumulationRule, AccumulativeChainingExecutor, RuleSelection, SelectionStrategy,
};
pub use conditional::ConditionalChainingExecutor;
pub use context::ChainContext;
pub use executor::{PatternExecutor, PatternSupport, RuleChainExecutor};
pub use fluent::{FluentBranch, FluentBuilderExecutor, FluentChainBuilder, FluentNode};
pub use model::{ChainPattern, ChainRuleSpec, RuleChain};
pub use result::ChainResult;
pub use routing::ResultBasedRoutingExecutor;
pub use sequential::SequentialDependencyExecutor;
pub use workflow::ComplexWorkflowExecutor;

use crate::engine::RuleEngine;
use crate::validation::ValidationResult;

/// Validate a chain definition without an engine at hand.
pub fn validate_chain(chain: &RuleChain) -> ValidationResult {
    let mut result = ValidationResult::new();
    if chain.id.trim().is_empty() {
        result.error("id", "rule chain id must not be empty");
    }
    let executor = RuleChainExecutor::new(Arc::new(RuleEngine::default()));
    result.merge("configuration", executor.validate(chain));
    result
}
