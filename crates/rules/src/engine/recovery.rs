//! Best-effort recovery when the evaluator fails on a rule.

use serde::Serialize;

use crate::expression::{Bindings, ExpressionError};

use super::result::RuleResult;

/// What a recovery implementation decided to do with a failed evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    /// Treat the rule as not triggered and carry on.
    ContinueWithDefault,
    /// Record the rule as skipped and carry on.
    SkipRule,
    /// Give up; the caller reports an error result.
    FailFast,
}

/// Outcome of a recovery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryResult {
    Recovered {
        strategy: RecoveryStrategy,
        result: RuleResult,
    },
    Failed {
        strategy: RecoveryStrategy,
        reason: String,
    },
}

/// Recovery capability consulted after an evaluator failure.
pub trait ErrorRecovery: Send + Sync {
    fn attempt(
        &self,
        rule_name: &str,
        condition: &str,
        bindings: &Bindings,
        cause: &ExpressionError,
    ) -> RecoveryResult;
}

/// Strategy table keyed by error kind.
#[derive(Debug, Clone)]
pub struct DefaultErrorRecovery {
    pub on_syntax_error: RecoveryStrategy,
    pub on_evaluation_error: RecoveryStrategy,
}

impl Default for DefaultErrorRecovery {
    fn default() -> Self {
        Self {
            on_syntax_error: RecoveryStrategy::FailFast,
            on_evaluation_error: RecoveryStrategy::FailFast,
        }
    }
}

impl DefaultErrorRecovery {
    /// Evaluation errors degrade to "not triggered"; syntax errors still fail.
    pub fn lenient() -> Self {
        Self {
            on_syntax_error: RecoveryStrategy::FailFast,
            on_evaluation_error: RecoveryStrategy::ContinueWithDefault,
        }
    }

    fn strategy_for(&self, cause: &ExpressionError) -> RecoveryStrategy {
        match cause {
            ExpressionError::Syntax { .. } => self.on_syntax_error,
            ExpressionError::Evaluation { .. } | ExpressionError::MissingVariable { .. } => {
                self.on_evaluation_error
            }
        }
    }
}

impl ErrorRecovery for DefaultErrorRecovery {
    fn attempt(
        &self,
        rule_name: &str,
        _condition: &str,
        _bindings: &Bindings,
        cause: &ExpressionError,
    ) -> RecoveryResult {
        let strategy = self.strategy_for(cause);
        match strategy {
            RecoveryStrategy::ContinueWithDefault => RecoveryResult::Recovered {
                strategy,
                result: RuleResult::not_triggered(rule_name)
                    .with_message(format!("Recovered '{}' with default result", rule_name))
                    .with_cause(cause.to_string()),
            },
            RecoveryStrategy::SkipRule => RecoveryResult::Recovered {
                strategy,
                result: RuleResult::not_triggered(rule_name)
                    .with_message(format!("Skipped '{}' after evaluation error", rule_name))
                    .with_cause(cause.to_string()),
            },
            RecoveryStrategy::FailFast => RecoveryResult::Failed {
                strategy,
                reason: cause.to_string(),
            },
        }
    }
}
