//! Document validation with structured errors and suggestions.
//!
//! Validates the metadata block every configuration document carries and
//! the type-specific body (scenario stage graphs, rule chains, enrichments,
//! registries). Returns a [`ValidationResult`] with errors (block loading)
//! and warnings (advisory).

mod document_checks;
mod metadata_checks;

pub mod fuzzy;

use serde::{Deserialize, Serialize};

use crate::schema::DocumentEnvelope;

pub use document_checks::validate_document;
pub use metadata_checks::validate_metadata;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path-like location, e.g. `"processing-stages[1].depends-on"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.errors.is_empty()
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    pub fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Fold another result into this one, prefixing its paths.
    pub fn merge(&mut self, prefix: &str, other: ValidationResult) {
        let join = |path: String| match (prefix.is_empty(), path.is_empty()) {
            (true, _) => path,
            (false, true) => prefix.to_string(),
            (false, false) => format!("{prefix}.{path}"),
        };
        if !other.is_valid() {
            self.valid = false;
        }
        for e in other.errors {
            self.errors.push(ValidationError { path: join(e.path), ..e });
        }
        for w in other.warnings {
            self.warnings.push(ValidationWarning { path: join(w.path), ..w });
        }
    }

    /// Error messages formatted as `path: message`.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| format_entry(&e.path, &e.message)).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| format_entry(&w.path, &w.message)).collect()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

fn format_entry(path: &str, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{path}: {message}")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Parse raw YAML, validate its metadata block, then its typed body.
///
/// Parse errors are reported as validation errors rather than returned.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    let raw: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(v) => v,
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            return result;
        }
    };

    let mut result = validate_metadata(&raw);
    if !result.is_valid() {
        return result;
    }

    let parsed = serde_yaml::from_value::<DocumentEnvelope>(raw)
        .map_err(|e| e.to_string())
        .and_then(|env| env.parse_full());
    match parsed {
        Ok(doc) => result.merge("", validate_document(&doc)),
        Err(e) => result.error("", format!("invalid document body: {e}")),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefixes_paths_and_propagates_validity() {
        let mut outer = ValidationResult::new();
        let mut inner = ValidationResult::new();
        inner.error("stage-name", "must not be empty");
        inner.warn("", "heads up");
        outer.merge("processing-stages[0]", inner);
        assert!(!outer.is_valid());
        assert_eq!(outer.errors[0].path, "processing-stages[0].stage-name");
        assert_eq!(outer.warnings[0].path, "processing-stages[0]");
    }

    #[test]
    fn validate_yaml_reports_parse_errors() {
        let result = validate_yaml("metadata: [unclosed");
        assert!(!result.is_valid());
        assert!(result.errors[0].message.contains("YAML parse error"));
    }

    #[test]
    fn validate_yaml_checks_metadata_then_body() {
        let yaml = r#"
metadata:
  id: swap-rules
  name: Swap rules
  version: "1.0.0"
  description: Validation rules for swaps
  type: rule-config
  author: risk@example.com
rules:
  - id: positive-notional
    condition: "data.notional > 0"
"#;
        let result = validate_yaml(yaml);
        assert!(result.is_valid(), "{:?}", result.errors);
    }
}
