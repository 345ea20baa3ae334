//! Evaluator plus compiled-expression cache, shared by the engine and enrichment.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{is_truthy, Bindings, CacheStats, CompiledExpression, ExpressionCache, ExpressionError, ExpressionEvaluator};

/// Compiles through an [`ExpressionCache`] and checks bindings before evaluating.
pub struct ExpressionService {
    evaluator: Arc<dyn ExpressionEvaluator>,
    cache: ExpressionCache,
}

impl ExpressionService {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            cache: ExpressionCache::new(),
        }
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        Arc::clone(&self.evaluator)
    }

    pub fn compile(&self, text: &str) -> Result<CompiledExpression, ExpressionError> {
        self.cache.get_or_compile(text, self.evaluator.as_ref())
    }

    /// Evaluate `text` against `bindings`.
    ///
    /// Variables the expression needs but `bindings` lacks are reported as
    /// [`ExpressionError::MissingVariable`] without invoking the evaluator.
    pub fn evaluate(&self, text: &str, bindings: &Bindings) -> Result<Value, ExpressionError> {
        let compiled = self.compile(text)?;
        self.evaluate_compiled(&compiled, bindings)
    }

    pub fn evaluate_compiled(
        &self,
        compiled: &CompiledExpression,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError> {
        let missing = compiled.missing_variables(bindings);
        if !missing.is_empty() {
            debug!(expression = %compiled, missing = ?missing, "expression references unbound variables");
            return Err(ExpressionError::MissingVariable {
                expression: compiled.source().to_string(),
                variables: missing,
            });
        }
        self.evaluator.evaluate(compiled, bindings)
    }

    pub fn evaluate_condition(&self, text: &str, bindings: &Bindings) -> Result<bool, ExpressionError> {
        self.evaluate(text, bindings).map(|v| is_truthy(&v))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::JinjaEvaluator;
    use serde_json::json;

    fn service() -> ExpressionService {
        ExpressionService::new(Arc::new(JinjaEvaluator::new()))
    }

    #[test]
    fn missing_variable_short_circuits() {
        let err = service().evaluate("amount > limit", &Bindings::new()).unwrap_err();
        match err {
            ExpressionError::MissingVariable { variables, .. } => {
                assert_eq!(variables, vec!["amount".to_string(), "limit".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn condition_uses_truthiness() {
        let mut b = Bindings::new();
        b.insert("flag".into(), json!(1));
        assert!(service().evaluate_condition("flag", &b).unwrap());
    }

    #[test]
    fn repeated_evaluation_reuses_compilation() {
        let svc = service();
        let mut b = Bindings::new();
        b.insert("x".into(), json!(2));
        svc.evaluate("x * 2", &b).unwrap();
        svc.evaluate("x * 2", &b).unwrap();
        assert_eq!(svc.cache_stats().hits, 1);
    }
}
