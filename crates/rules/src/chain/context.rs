//! Single-owner variable scope threaded through one chain execution.

use indexmap::IndexMap;
use rulekit_core::FieldAccessor;
use serde_json::Value;

use crate::expression::{parse_number, Bindings};

/// Named variables plus intermediate results of one chain execution.
///
/// Each execution owns its context; executors read inputs from it and write
/// every intermediate value back so later rules can reference them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainContext {
    variables: Bindings,
    stage_results: IndexMap<String, Value>,
    execution_path: Vec<String>,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bindings(variables: Bindings) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Every field of the record becomes a top-level variable.
    pub fn from_record(record: &dyn FieldAccessor) -> Self {
        match record.to_value() {
            Value::Object(map) => Self::from_bindings(map),
            _ => Self::default(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// A variable, falling back to a recorded stage result of the same name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).or_else(|| self.stage_results.get(name))
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(parse_number)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).map_or(false, |v| !v.is_null())
    }

    /// Record an intermediate result (visible to later expressions).
    pub fn set_stage_result(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.stage_results.insert(key.into(), value.into());
    }

    pub fn stage_result(&self, key: &str) -> Option<&Value> {
        self.stage_results.get(key)
    }

    pub fn stage_results(&self) -> &IndexMap<String, Value> {
        &self.stage_results
    }

    pub fn enter_stage(&mut self, stage: impl Into<String>) {
        self.execution_path.push(stage.into());
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.execution_path.last().map(String::as_str)
    }

    pub fn execution_path(&self) -> &[String] {
        &self.execution_path
    }

    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    /// Evaluation bindings: variables, plus stage results they do not shadow.
    pub fn bindings(&self) -> Bindings {
        let mut bindings = self.variables.clone();
        for (key, value) in &self.stage_results {
            if !bindings.contains_key(key) {
                bindings.insert(key.clone(), value.clone());
            }
        }
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulekit_core::MapRecord;
    use serde_json::json;

    #[test]
    fn variables_shadow_stage_results() {
        let mut ctx = ChainContext::new().with("score", 1);
        ctx.set_stage_result("score", 99);
        ctx.set_stage_result("routeKey", "HIGH");
        let b = ctx.bindings();
        assert_eq!(b["score"], json!(1));
        assert_eq!(b["routeKey"], json!("HIGH"));
        assert_eq!(ctx.get("routeKey"), Some(&json!("HIGH")));
    }

    #[test]
    fn from_record_binds_fields() {
        let record = MapRecord::new().with("amount", 250).with("currency", "USD");
        let ctx = ChainContext::from_record(&record);
        assert_eq!(ctx.get_number("amount"), Some(250.0));
        assert!(ctx.contains("currency"));
        assert!(!ctx.contains("missing"));
    }

    #[test]
    fn execution_path_tracks_stages() {
        let mut ctx = ChainContext::new();
        ctx.enter_stage("trigger");
        ctx.enter_stage("on-trigger");
        assert_eq!(ctx.current_stage(), Some("on-trigger"));
        assert_eq!(ctx.execution_path().len(), 2);
    }
}
