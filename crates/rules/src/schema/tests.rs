//! Tests for schema types.

use super::*;
use crate::engine::Severity;
use crate::scenario::FailurePolicy;

const SCENARIO_YAML: &str = r#"
metadata:
  id: swap-processing
  name: Swap processing
  version: "1.0.0"
  description: Multi-stage swap processing
  type: scenario
  business-domain: Derivatives
  owner: derivatives@example.com
scenario:
  scenario-id: swap-processing
  name: Swap processing
  data-types: [Swap, InterestRateSwap]
  processing-stages:
    - stage-name: basic-validation
      config-file: rules/swap-basic.yaml
      execution-order: 1
      failure-policy: terminate
    - stage-name: enrichment
      config-file: rules/swap-enrichment.yaml
      execution-order: 2
      depends-on: [basic-validation]
      required: false
      stage-metadata:
        sla-ms: 200
"#;

const REGISTRY_YAML: &str = r#"
metadata:
  id: scenario-registry
  name: Registry
  version: "1.0"
  description: All scenarios
  type: scenario-registry
  created-by: ops@example.com
scenarios:
  - scenario-id: swap-processing
    config-file: scenarios/swap.yaml
    data-types: [Swap]
routing:
  strategy: type-based-with-fallback
  default-scenario: swap-processing
  rules:
    - condition: "dataType == 'Bond'"
      target-scenario: bond-processing
"#;

#[test]
fn document_type_round_trips_through_strings() {
    for t in DocumentType::ALL {
        assert_eq!(t.to_string().parse::<DocumentType>().unwrap(), t);
    }
    assert!("rule_config".parse::<DocumentType>().is_err());
    assert_eq!(DocumentType::names().len(), 9);
}

#[test]
fn required_metadata_per_type() {
    assert_eq!(DocumentType::Scenario.required_metadata(), &["business-domain", "owner"]);
    assert_eq!(DocumentType::Dataset.required_metadata(), &["source"]);
    assert!(DocumentType::Bootstrap.required_metadata().is_empty());
}

#[test]
fn parse_scenario_document() {
    let doc = parse_document(SCENARIO_YAML).unwrap();
    assert_eq!(doc.document_type(), Some(DocumentType::Scenario));
    assert_eq!(doc.metadata.business_domain.as_deref(), Some("Derivatives"));

    let scenario = doc.as_scenario().unwrap();
    assert_eq!(scenario.scenario_id, "swap-processing");
    assert_eq!(scenario.processing_stages.len(), 2);

    let validation = &scenario.processing_stages[0];
    assert_eq!(validation.policy(), FailurePolicy::Terminate);
    assert!(validation.required);

    let enrichment = &scenario.processing_stages[1];
    assert_eq!(enrichment.depends_on, vec!["basic-validation"]);
    assert!(!enrichment.required);
    assert_eq!(enrichment.policy(), FailurePolicy::ContinueWithWarnings);
    assert!(enrichment.stage_metadata.contains_key("sla-ms"));
}

#[test]
fn parse_registry_document() {
    let doc = parse_document(REGISTRY_YAML).unwrap();
    let registry = doc.as_registry().unwrap();
    assert_eq!(registry.scenarios[0].config_file, "scenarios/swap.yaml");
    let routing = registry.routing.as_ref().unwrap();
    assert_eq!(routing.default_scenario.as_deref(), Some("swap-processing"));
    assert_eq!(routing.rules[0].target_scenario, "bond-processing");
    assert!(doc.as_scenario().is_none());
}

#[test]
fn parse_rule_config_with_groups_and_chains() {
    let yaml = r#"
metadata:
  id: credit-rules
  name: Credit
  version: 1.2
  description: Credit checks
  type: rule-config
  author: credit@example.com
rules:
  - id: score-ok
    condition: "creditScore >= 650"
    severity: WARNING
  - id: income-ok
    condition: "income > 30000"
rule-groups:
  - id: eligibility
    operator: AND
    rule-ids: [score-ok, income-ok]
rule-chains:
  - id: risk
    pattern: accumulative-chaining
    configuration:
      accumulator-variable: riskScore
      accumulation-rules:
        - id: r1
          condition: "1"
          weight: 2
"#;
    let doc = parse_document(yaml).unwrap();
    assert_eq!(doc.metadata.version.as_deref(), Some("1.2"));
    let body = doc.as_rule_config().unwrap();
    assert_eq!(body.rules[0].severity, Severity::Warning);
    assert_eq!(body.rule_chains[0].configuration["accumulator-variable"], "riskScore");

    let set = body.rule_set().unwrap();
    assert_eq!(set.groups[0].len(), 2);
}

#[test]
fn parse_other_types_keep_raw_body() {
    let yaml = "metadata:\n  id: boot\n  name: b\n  type: bootstrap\nsteps: [a, b]\n";
    let doc = parse_document(yaml).unwrap();
    match doc.body {
        DocumentBody::Other(value) => assert!(value.get("steps").is_some()),
        other => panic!("expected raw body, got {other:?}"),
    }
}

#[test]
fn unknown_type_is_rejected() {
    let err = parse_document("metadata:\n  id: x\n  type: scenaro\n").unwrap_err();
    assert!(err.contains("unknown document type"));
}
