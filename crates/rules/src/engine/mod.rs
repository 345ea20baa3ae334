//! Rule execution engine.
//!
//! Evaluates single rules, AND/OR rule groups and ordered rule lists against
//! a binding set, with first-match-wins list semantics, missing-variable
//! detection, recovery on evaluator failure and per-rule metrics.

mod executor;
mod metrics;
mod model;
mod recovery;
mod result;
mod ruleset;


pub use executor::RuleEngine;
pub use metrics::{EvaluationRecord, RuleMetrics, RuleMetricsSummary};
pub(crate) use model::default_true;
pub use model::{Category, GroupOperator, Rule, RuleGroup, RuleGroupDef, RuleReference, Severity};
pub use recovery::{DefaultErrorRecovery, ErrorRecovery, RecoveryResult, RecoveryStrategy};
pub use result::{EvaluationTiming, ResultKind, RuleResult, RuleSetOutcome};
pub use ruleset::{RuleItem, RuleSet};
