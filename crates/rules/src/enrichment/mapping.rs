//! Field mappings from a lookup result (or the record itself) onto the record.

use rulekit_core::FieldAccessor;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::EnrichmentError;
use super::types::FieldMapping;
use crate::expression::{Bindings, ExpressionService};

/// Read `path` from a structured value; dots descend into nested objects.
pub(crate) fn read_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(v) = source.get(path) {
        return Some(v);
    }
    path.split('.').try_fold(source, |current, segment| current.get(segment))
}

/// Record fields as evaluation bindings.
pub(crate) fn record_bindings(record: &dyn FieldAccessor) -> Bindings {
    match record.to_value() {
        Value::Object(map) => map,
        _ => Bindings::new(),
    }
}

/// Apply `mappings` from `source` onto `target`.
///
/// Values are resolved for every mapping before any field is written, so a
/// missing required field leaves the record untouched. A bare scalar source
/// (no structured result) only contributes defaults. Null values are never
/// written. Returns the target fields written.
pub fn apply_mappings(
    mappings: &[FieldMapping],
    source: &Value,
    target: &mut dyn FieldAccessor,
    expressions: &ExpressionService,
) -> Result<Vec<String>, EnrichmentError> {
    let structured = source.is_object();
    if !structured && !source.is_null() {
        debug!("lookup returned a bare value, applying defaults only");
    }

    let bindings = record_bindings(target);
    let mut writes = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let found = if structured {
            read_path(source, &mapping.source_field).filter(|v| !v.is_null()).cloned()
        } else {
            None
        };
        if found.is_none() && structured && mapping.required {
            return Err(EnrichmentError::MissingRequiredField {
                source_field: mapping.source_field.clone(),
                target_field: mapping.target_field.clone(),
            });
        }

        let mut value = found.or_else(|| mapping.default_value.clone()).unwrap_or(Value::Null);
        if let Some(transform) = mapping.transformation.as_deref().filter(|t| !t.trim().is_empty()) {
            value = transformed(transform, value, &bindings, expressions);
        }
        if !value.is_null() {
            writes.push((mapping.target_field.clone(), value));
        }
    }

    let mut written = Vec::with_capacity(writes.len());
    for (field, value) in writes {
        target.set_field(&field, value)?;
        written.push(field);
    }
    Ok(written)
}

/// Evaluate a transformation with the raw value bound as `value`; the raw
/// value survives a failed transformation.
fn transformed(expression: &str, value: Value, bindings: &Bindings, expressions: &ExpressionService) -> Value {
    let mut scope = bindings.clone();
    scope.insert("value".to_string(), value.clone());
    match expressions.evaluate(expression, &scope) {
        Ok(v) => v,
        Err(e) => {
            warn!(expression, error = %e, "field transformation failed, keeping raw value");
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::JinjaEvaluator;
    use rulekit_core::MapRecord;
    use serde_json::json;
    use std::sync::Arc;

    fn expressions() -> ExpressionService {
        ExpressionService::new(Arc::new(JinjaEvaluator::new()))
    }

    #[test]
    fn maps_defaults_and_transforms() {
        let mut record = MapRecord::new().with("currency", "usd");
        let mappings = vec![
            FieldMapping::new("name", "currencyName").with_transformation("value | upper"),
            FieldMapping::new("region", "region").with_default("GLOBAL"),
            FieldMapping::new("details.decimals", "decimals"),
            FieldMapping::new("absent", "absent"),
        ];
        let source = json!({"name": "Dollar", "details": {"decimals": 2}});
        let written = apply_mappings(&mappings, &source, &mut record, &expressions()).unwrap();
        assert_eq!(written, vec!["currencyName", "region", "decimals"]);
        assert_eq!(record.get("currencyName"), Some(&json!("DOLLAR")));
        assert_eq!(record.get("region"), Some(&json!("GLOBAL")));
        assert_eq!(record.get("decimals"), Some(&json!(2)));
        assert!(record.get("absent").is_none());
    }

    #[test]
    fn required_field_missing_writes_nothing() {
        let mut record = MapRecord::new();
        let mappings = vec![
            FieldMapping::new("name", "name"),
            FieldMapping::new("rating", "rating").required(),
        ];
        let err = apply_mappings(&mappings, &json!({"name": "ACME"}), &mut record, &expressions()).unwrap_err();
        assert!(matches!(err, EnrichmentError::MissingRequiredField { .. }));
        assert!(record.is_empty());
    }

    #[test]
    fn bare_scalar_source_applies_defaults_only() {
        let mut record = MapRecord::new();
        let mappings = vec![
            FieldMapping::new("rating", "rating").required().with_default("NR"),
            FieldMapping::new("name", "name"),
        ];
        apply_mappings(&mappings, &json!("not found"), &mut record, &expressions()).unwrap();
        assert_eq!(record.get("rating"), Some(&json!("NR")));
        assert!(record.get("name").is_none());
    }

    #[test]
    fn failed_transformation_keeps_raw_value() {
        let mut record = MapRecord::new();
        let mappings = vec![FieldMapping::new("n", "n").with_transformation("value * unknown_factor")];
        apply_mappings(&mappings, &json!({"n": 3}), &mut record, &expressions()).unwrap();
        assert_eq!(record.get("n"), Some(&json!(3)));
    }
}
