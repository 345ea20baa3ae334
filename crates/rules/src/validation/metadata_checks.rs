//! Metadata block checks: required fields, document type, version format.

use serde_yaml::Value;

use super::fuzzy::{fuzzy_match, is_kebab_case};
use super::ValidationResult;
use crate::schema::DocumentType;

const REQUIRED_FIELDS: &[&str] = &["id", "name", "version", "description", "type"];

/// Validate the `metadata` block of a raw document.
pub fn validate_metadata(document: &Value) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(metadata) = document.get("metadata") else {
        result.error("metadata", "document has no metadata section");
        return result;
    };
    if !metadata.is_mapping() {
        result.error("metadata", "metadata must be a mapping");
        return result;
    }

    for field in REQUIRED_FIELDS {
        if text(metadata, field).is_none() {
            result.error(format!("metadata.{field}"), format!("missing required field '{field}'"));
        }
    }

    if let Some(id) = text(metadata, "id") {
        if !is_kebab_case(&id) {
            result.warn("metadata.id", format!("id '{id}' is not kebab-case"));
        }
    }

    if let Some(version) = text(metadata, "version") {
        if !is_semver_like(&version) {
            result.warn(
                "metadata.version",
                format!("version '{version}' does not follow MAJOR.MINOR[.PATCH]"),
            );
        }
    }

    let Some(type_name) = text(metadata, "type") else {
        return result;
    };
    let doc_type = match type_name.parse::<DocumentType>() {
        Ok(t) => t,
        Err(_) => {
            let names = DocumentType::names();
            let message = format!("unknown document type '{type_name}'");
            match fuzzy_match(&type_name, &names) {
                Some(s) => result.error_with_suggestion("metadata.type", message, format!("did you mean '{s}'?")),
                None => result.error("metadata.type", format!("{message}; expected one of: {}", names.join(", "))),
            }
            return result;
        }
    };

    for field in doc_type.required_metadata() {
        if text(metadata, field).is_none() {
            result.error(
                format!("metadata.{field}"),
                format!("'{field}' is required for {doc_type} documents"),
            );
        }
    }

    result
}

/// Non-empty scalar field as text. Unquoted numbers such as `version: 1.0` count.
fn text(map: &Value, key: &str) -> Option<String> {
    let s = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// `MAJOR.MINOR` or `MAJOR.MINOR.PATCH`, digits only.
fn is_semver_like(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(yaml: &str) -> ValidationResult {
        validate_metadata(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn complete_scenario_metadata_is_valid() {
        let r = check(
            "metadata:\n  id: swap-processing\n  name: Swap\n  version: '1.0.0'\n  description: d\n  type: scenario\n  business-domain: Derivatives\n  owner: desk@example.com\n",
        );
        assert!(r.is_valid(), "{:?}", r.errors);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn missing_metadata_section() {
        let r = check("rules: []\n");
        assert!(!r.is_valid());
        assert_eq!(r.errors[0].path, "metadata");
    }

    #[test]
    fn reports_every_missing_required_field() {
        let r = check("metadata:\n  id: x\n");
        let paths: Vec<_> = r.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["metadata.name", "metadata.version", "metadata.description", "metadata.type"]);
    }

    #[test]
    fn unknown_type_gets_suggestion() {
        let r = check("metadata:\n  id: x\n  name: n\n  version: '1.0'\n  description: d\n  type: rule-cofig\n");
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].suggestion.as_deref(), Some("did you mean 'rule-config'?"));
    }

    #[test]
    fn type_specific_fields() {
        let r = check("metadata:\n  id: reg\n  name: n\n  version: '1.0'\n  description: d\n  type: scenario-registry\n");
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].path, "metadata.created-by");

        let r = check("metadata:\n  id: ds\n  name: n\n  version: '1.0'\n  description: d\n  type: dataset\n  source: ops\n");
        assert!(r.is_valid());
    }

    #[test]
    fn odd_version_is_only_a_warning() {
        let r = check("metadata:\n  id: b\n  name: n\n  version: v1\n  description: d\n  type: bootstrap\n");
        assert!(r.is_valid());
        assert_eq!(r.warnings[0].path, "metadata.version");
    }

    #[test]
    fn semver_like_versions() {
        assert!(is_semver_like("1.0"));
        assert!(is_semver_like("2.10.3"));
        assert!(!is_semver_like("1"));
        assert!(!is_semver_like("1.0.0.0"));
        assert!(!is_semver_like("1.x"));
    }
}
