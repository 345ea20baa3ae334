//! Expression evaluation seam.
//!
//! Conditions, scores, routing keys and enrichment transforms are all short
//! expressions evaluated against a named-variable binding set. The engine only
//! depends on the [`ExpressionEvaluator`] contract; [`JinjaEvaluator`] is the
//! embedded implementation.

mod cache;
mod jinja;
mod service;
mod variables;

pub use cache::{CacheStats, ExpressionCache};
pub use jinja::JinjaEvaluator;
pub use service::ExpressionService;
pub use variables::referenced_variables;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Named variables an expression is evaluated against.
pub type Bindings = serde_json::Map<String, Value>;

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("evaluation of '{expression}' failed: {message}")]
    Evaluation { expression: String, message: String },

    #[error("missing required variables for '{expression}': {}", variables.join(", "))]
    MissingVariable {
        expression: String,
        variables: Vec<String>,
    },
}

impl ExpressionError {
    pub fn expression(&self) -> &str {
        match self {
            ExpressionError::Syntax { expression, .. }
            | ExpressionError::Evaluation { expression, .. }
            | ExpressionError::MissingVariable { expression, .. } => expression,
        }
    }
}

/// A syntax-checked expression plus the top-level variables it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpression {
    source: Arc<str>,
    variables: Arc<[String]>,
}

impl CompiledExpression {
    pub fn new(source: &str, variables: Vec<String>) -> Self {
        Self {
            source: Arc::from(source),
            variables: Arc::from(variables),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Variables this expression reads that `bindings` does not define.
    pub fn missing_variables(&self, bindings: &Bindings) -> Vec<String> {
        self.variables
            .iter()
            .filter(|v| !bindings.contains_key(v.as_str()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile/evaluate contract for the embedded expression language.
pub trait ExpressionEvaluator: Send + Sync {
    fn compile(&self, text: &str) -> Result<CompiledExpression, ExpressionError>;

    fn evaluate(
        &self,
        expression: &CompiledExpression,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError>;
}

// ── Coercion ────────────────────────────────────────────────────────

/// Numeric view of an evaluation result.
///
/// Numbers pass through, booleans map to 1.0/0.0, strings are parsed and
/// anything unparseable (or null) counts as 0.0.
pub fn to_number(value: &Value) -> f64 {
    parse_number(value).unwrap_or(0.0)
}

/// Like [`to_number`] but distinguishes "not a number" from zero.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Truthiness used for conditions.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value as a plain label (strings unquoted).
pub fn to_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_coercion() {
        assert_eq!(to_number(&json!(2.5)), 2.5);
        assert_eq!(to_number(&json!(true)), 1.0);
        assert_eq!(to_number(&json!(false)), 0.0);
        assert_eq!(to_number(&json!(" 7 ")), 7.0);
        assert_eq!(to_number(&json!("abc")), 0.0);
        assert_eq!(to_number(&Value::Null), 0.0);
        assert_eq!(parse_number(&json!("abc")), None);
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&Value::Null));
        assert!(is_truthy(&json!("HIGH")));
    }

    #[test]
    fn missing_variables_are_reported_in_order() {
        let compiled = CompiledExpression::new("a > b", vec!["a".into(), "b".into()]);
        let mut bindings = Bindings::new();
        bindings.insert("b".into(), json!(1));
        assert_eq!(compiled.missing_variables(&bindings), vec!["a".to_string()]);
    }
}
