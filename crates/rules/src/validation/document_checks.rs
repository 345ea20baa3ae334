//! Type-specific body checks: rule configs, scenarios, registries, datasets.

use std::collections::HashSet;

use super::fuzzy::fuzzy_match;
use super::ValidationResult;
use crate::chain::validate_chain;
use crate::enrichment::{DatasetConfig, DatasetKind, Enrichment, EnrichmentType};
use crate::schema::{ConfigDocument, DatasetBody, DocumentBody, RegistryBody, RuleConfigBody};
use crate::scenario::validate_scenario;

/// Validate the typed body of a parsed document.
pub fn validate_document(document: &ConfigDocument) -> ValidationResult {
    match &document.body {
        DocumentBody::RuleConfig(body) => validate_rule_config(body),
        DocumentBody::Scenario(body) => {
            let mut result = ValidationResult::new();
            result.merge("scenario", validate_scenario(&body.scenario));
            result
        }
        DocumentBody::Registry(body) => validate_registry(body),
        DocumentBody::Dataset(body) => validate_dataset(body),
        DocumentBody::Other(_) => ValidationResult::new(),
    }
}

// ── Rule config ─────────────────────────────────────────────────────

fn validate_rule_config(body: &RuleConfigBody) -> ValidationResult {
    let mut result = ValidationResult::new();

    if body.rules.is_empty() && body.rule_chains.is_empty() && body.enrichments.is_empty() {
        result.warn("", "document defines no rules, rule-chains or enrichments");
    }

    for (i, rule) in body.rules.iter().enumerate() {
        if rule.id.trim().is_empty() {
            result.error(format!("rules[{i}].id"), "rule id must not be empty");
        }
        if rule.condition.trim().is_empty() {
            result.error(format!("rules[{i}].condition"), "condition must not be empty");
        }
    }
    if let Err(e) = body.rule_set() {
        result.error("rule-groups", e.to_string());
    }

    let mut chain_ids = HashSet::new();
    for (i, chain) in body.rule_chains.iter().enumerate() {
        if !chain.id.is_empty() && !chain_ids.insert(chain.id.as_str()) {
            result.error(format!("rule-chains[{i}].id"), format!("duplicate rule-chain id '{}'", chain.id));
        }
        result.merge(&format!("rule-chains[{i}]"), validate_chain(chain));
    }

    let mut enrichment_ids = HashSet::new();
    for (i, enrichment) in body.enrichments.iter().enumerate() {
        let path = format!("enrichments[{i}]");
        if enrichment.id.trim().is_empty() {
            result.error(format!("{path}.id"), "enrichment id must not be empty");
        } else if !enrichment_ids.insert(enrichment.id.as_str()) {
            result.error(format!("{path}.id"), format!("duplicate enrichment id '{}'", enrichment.id));
        }
        result.merge(&path, validate_enrichment(enrichment));
    }

    result
}

fn validate_enrichment(enrichment: &Enrichment) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (i, mapping) in enrichment.field_mappings.iter().enumerate() {
        if mapping.source_field.trim().is_empty() {
            result.error(format!("field-mappings[{i}].source-field"), "must not be empty");
        }
        if mapping.target_field.trim().is_empty() {
            result.error(format!("field-mappings[{i}].target-field"), "must not be empty");
        }
    }

    match enrichment.enrichment_type {
        EnrichmentType::Lookup => {
            let Some(config) = &enrichment.lookup_config else {
                result.error("lookup-config", "lookup enrichments require a lookup-config");
                return result;
            };
            if config.lookup_key.trim().is_empty() {
                result.error("lookup-config.lookup-key", "lookup-key must not be empty");
            }
            match (&config.lookup_service, &config.lookup_dataset) {
                (None, None) => result.error("lookup-config", "either lookup-service or lookup-dataset is required"),
                (Some(_), Some(_)) => {
                    result.warn("lookup-config", "both lookup-service and lookup-dataset are set; lookup-service is used")
                }
                (None, Some(dataset)) => result.merge("lookup-config.lookup-dataset", validate_dataset_config(dataset)),
                (Some(_), None) => {}
            }
            if enrichment.field_mappings.is_empty() {
                result.warn("field-mappings", "lookup enrichment has no field-mappings");
            }
        }
        EnrichmentType::Calculation => match &enrichment.calculation_config {
            None => result.error("calculation-config", "calculation enrichments require a calculation-config"),
            Some(config) => {
                if config.expression.trim().is_empty() {
                    result.error("calculation-config.expression", "expression must not be empty");
                }
                if config.result_field.trim().is_empty() {
                    result.error("calculation-config.result-field", "result-field must not be empty");
                }
            }
        },
        EnrichmentType::Field => {
            if enrichment.field_mappings.is_empty() {
                result.error("field-mappings", "field enrichments require at least one field mapping");
            }
        }
    }
    result
}

fn validate_dataset_config(dataset: &DatasetConfig) -> ValidationResult {
    let mut result = ValidationResult::new();
    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    if dataset.kind != DatasetKind::Database && dataset.key_field.trim().is_empty() {
        result.error("key-field", format!("{} datasets require a key-field", dataset.kind));
    }
    match dataset.kind {
        DatasetKind::Inline if dataset.data.is_empty() => result.warn("data", "inline dataset has no records"),
        DatasetKind::Inline => {}
        DatasetKind::YamlFile | DatasetKind::CsvFile => {
            if !has(&dataset.file_path) {
                result.error("file-path", format!("{} datasets require a file-path", dataset.kind));
            }
        }
        DatasetKind::Database => {
            if !has(&dataset.connection_name) {
                result.error("connection-name", "database datasets require a connection-name");
            }
            if !has(&dataset.query) {
                result.error("query", "database datasets require a query");
            }
        }
    }
    if let Some(ttl) = dataset.cache_ttl_seconds {
        if ttl == 0 && dataset.cache_enabled == Some(true) {
            result.warn("cache-ttl-seconds", "cache enabled with a zero TTL never serves a hit");
        }
    }
    result
}

// ── Registry ────────────────────────────────────────────────────────

fn validate_registry(body: &RegistryBody) -> ValidationResult {
    let mut result = ValidationResult::new();
    if body.scenarios.is_empty() {
        result.warn("scenarios", "registry lists no scenarios");
    }

    let mut ids: Vec<&str> = Vec::new();
    for (i, entry) in body.scenarios.iter().enumerate() {
        let id = entry.scenario_id.trim();
        if id.is_empty() {
            result.error(format!("scenarios[{i}].scenario-id"), "scenario-id must not be empty");
        } else if ids.contains(&id) {
            result.error(format!("scenarios[{i}].scenario-id"), format!("duplicate scenario-id '{id}'"));
        } else {
            ids.push(id);
        }
        if entry.config_file.trim().is_empty() {
            result.error(format!("scenarios[{i}].config-file"), "config-file must not be empty");
        }
    }

    let Some(routing) = &body.routing else {
        return result;
    };
    if let Some(default) = routing.default_scenario.as_deref() {
        if !ids.contains(&default) {
            let message = format!("default-scenario '{default}' is not listed in scenarios");
            match fuzzy_match(default, &ids) {
                Some(s) => result.error_with_suggestion("routing.default-scenario", message, format!("did you mean '{s}'?")),
                None => result.error("routing.default-scenario", message),
            }
        }
    }
    for (i, rule) in routing.rules.iter().enumerate() {
        if rule.condition.trim().is_empty() {
            result.error(format!("routing.rules[{i}].condition"), "condition must not be empty");
        }
        if !ids.contains(&rule.target_scenario.as_str()) {
            result.warn(
                format!("routing.rules[{i}].target-scenario"),
                format!("target-scenario '{}' is not listed in scenarios", rule.target_scenario),
            );
        }
    }
    result
}

// ── Dataset ─────────────────────────────────────────────────────────

fn validate_dataset(body: &DatasetBody) -> ValidationResult {
    let mut result = ValidationResult::new();
    let Some(key_field) = body.key_field.as_deref().filter(|k| !k.trim().is_empty()) else {
        if !body.data.is_empty() {
            result.error("key-field", "datasets with data require a key-field");
        }
        return result;
    };
    for (i, record) in body.data.iter().enumerate() {
        if record.get(key_field).map_or(true, |v| v.is_null()) {
            result.warn(format!("data[{i}]"), format!("record has no '{key_field}' value"));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_document;

    const HEADER: &str = "metadata:\n  id: doc\n  name: doc\n  version: '1.0'\n  description: d\n  author: a\n  created-by: a\n  source: s\n  business-domain: b\n  owner: o\n";

    fn check(doc_type: &str, body: &str) -> ValidationResult {
        let yaml = format!("{HEADER}  type: {doc_type}\n{body}");
        validate_document(&parse_document(&yaml).unwrap())
    }

    #[test]
    fn clean_rule_config() {
        let r = check("rule-config", "rules:\n  - id: a\n    condition: 'x > 1'\n");
        assert!(r.is_valid(), "{:?}", r.errors);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn empty_rule_config_warns() {
        let r = check("rule-config", "rules: []\n");
        assert!(r.is_valid());
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn duplicate_rules_and_unknown_group_members() {
        let r = check("rule-config", "rules:\n  - id: a\n    condition: 'x'\n  - id: a\n    condition: 'y'\n");
        assert!(r.errors[0].message.contains("duplicate rule id 'a'"));

        let r = check(
            "rule-config",
            "rules:\n  - id: a\n    condition: 'x'\nrule-groups:\n  - id: g\n    rule-ids: [a, ghost]\n",
        );
        assert!(r.errors[0].message.contains("unknown rule 'ghost'"));
    }

    #[test]
    fn chain_errors_carry_chain_path() {
        let r = check(
            "rule-chain",
            "rule-chains:\n  - id: c\n    pattern: sequential-dependency\n    configuration:\n      stages: []\n",
        );
        assert_eq!(r.errors[0].path, "rule-chains[0].configuration.stages");
    }

    #[test]
    fn enrichment_shapes() {
        let r = check(
            "enrichment",
            r#"enrichments:
  - id: lookup-no-source
    type: lookup
    lookup-config:
      lookup-key: code
    field-mappings:
      - source-field: name
        target-field: currencyName
  - id: csv-no-path
    type: lookup
    lookup-config:
      lookup-key: code
      lookup-dataset:
        type: csv-file
        key-field: code
    field-mappings:
      - source-field: name
        target-field: n
  - id: calc
    type: calculation
  - id: calc
    type: field
"#,
        );
        let paths: Vec<_> = r.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "enrichments[0].lookup-config",
                "enrichments[1].lookup-config.lookup-dataset.file-path",
                "enrichments[2].calculation-config",
                "enrichments[3].id",
                "enrichments[3].field-mappings",
            ]
        );
    }

    #[test]
    fn scenario_errors_are_prefixed() {
        let r = check(
            "scenario",
            "scenario:\n  scenario-id: s\n  processing-stages:\n    - stage-name: a\n      config-file: a.yaml\n      execution-order: 1\n      depends-on: [b]\n",
        );
        assert!(!r.is_valid());
        assert_eq!(r.errors[0].path, "scenario.processing-stages[0].depends-on");
    }

    #[test]
    fn registry_default_must_be_listed() {
        let r = check(
            "scenario-registry",
            "scenarios:\n  - scenario-id: swap-processing\n    config-file: s.yaml\nrouting:\n  default-scenario: swap-procesing\n  rules:\n    - condition: \"dataType == 'Bond'\"\n      target-scenario: bond\n",
        );
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].suggestion.as_deref(), Some("did you mean 'swap-processing'?"));
        assert_eq!(r.warnings[0].path, "routing.rules[0].target-scenario");
    }

    #[test]
    fn dataset_records_need_keys() {
        let r = check("dataset", "key-field: code\ndata:\n  - code: EUR\n  - name: nameless\n");
        assert!(r.is_valid());
        assert_eq!(r.warnings[0].path, "data[1]");

        let r = check("dataset", "data:\n  - code: EUR\n");
        assert!(!r.is_valid());
    }
}
