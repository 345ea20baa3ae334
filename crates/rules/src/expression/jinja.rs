//! Minijinja-backed expression evaluator.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use super::{referenced_variables, Bindings, CompiledExpression, ExpressionError, ExpressionEvaluator};

/// Evaluates expressions with the minijinja expression language.
///
/// Undefined variables and attributes are errors rather than silently empty
/// values, so a typo in a condition surfaces as an evaluation failure.
pub struct JinjaEvaluator {
    env: Environment<'static>,
}

impl JinjaEvaluator {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl Default for JinjaEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for JinjaEvaluator {
    fn compile(&self, text: &str) -> Result<CompiledExpression, ExpressionError> {
        if text.trim().is_empty() {
            return Err(ExpressionError::Syntax {
                expression: text.to_string(),
                message: "expression is empty".to_string(),
            });
        }
        self.env
            .compile_expression(text)
            .map_err(|e| ExpressionError::Syntax {
                expression: text.to_string(),
                message: e.to_string(),
            })?;
        Ok(CompiledExpression::new(text, referenced_variables(text)))
    }

    fn evaluate(
        &self,
        expression: &CompiledExpression,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError> {
        let source = expression.source();
        let compiled = self
            .env
            .compile_expression(source)
            .map_err(|e| ExpressionError::Syntax {
                expression: source.to_string(),
                message: e.to_string(),
            })?;
        let evaluation_error = |message: String| ExpressionError::Evaluation {
            expression: source.to_string(),
            message,
        };
        let value = compiled.eval(bindings).map_err(|e| evaluation_error(e.to_string()))?;
        serde_json::to_value(&value).map_err(|e| evaluation_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings(v: Value) -> Bindings {
        match v {
            Value::Object(m) => m,
            _ => Bindings::new(),
        }
    }

    fn eval(text: &str, vars: Value) -> Result<Value, ExpressionError> {
        let ev = JinjaEvaluator::new();
        let compiled = ev.compile(text)?;
        ev.evaluate(&compiled, &bindings(vars))
    }

    #[test]
    fn boolean_conditions() {
        assert_eq!(eval("amount > 100", json!({"amount": 150})).unwrap(), json!(true));
        assert_eq!(
            eval("data.region == 'US' and data.notional > 0", json!({"data": {"region": "US", "notional": 5}}))
                .unwrap(),
            json!(true)
        );
    }

    #[test]
    fn numeric_and_string_results() {
        assert_eq!(eval("score * 2.0", json!({"score": 3})).unwrap(), json!(6.0));
        assert_eq!(
            eval("'HIGH' if totalScore >= 50 else 'LOW'", json!({"totalScore": 70})).unwrap(),
            json!("HIGH")
        );
    }

    #[test]
    fn syntax_errors_surface_at_compile() {
        let ev = JinjaEvaluator::new();
        assert!(matches!(ev.compile("amount >"), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(ev.compile("   "), Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn compile_records_variables() {
        let ev = JinjaEvaluator::new();
        let compiled = ev.compile("a + b.c").unwrap();
        assert_eq!(compiled.variables(), &["a".to_string(), "b".to_string()]);
    }
}
