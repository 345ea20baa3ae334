//! Integration tests over the fixture configuration tree in
//! `tests/fixtures/config/`: registry loading, routing, end-to-end scenario
//! execution and dependency analysis.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rulekit_core::{FieldAccessor, MapRecord};
use rulekit_rules::dependency::{DependencyAnalyzer, NodeStatus};
use rulekit_rules::engine::RuleEngine;
use rulekit_rules::enrichment::EnrichmentProcessor;
use rulekit_rules::loader::DocumentLoader;
use rulekit_rules::scenario::{ScenarioError, ScenarioService, ScenarioStatus, StageOutcome};
use rulekit_rules::validation::validate_yaml;
use serde_json::json;

fn config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config")
}

fn service() -> ScenarioService {
    let dir = config_dir();
    let service = ScenarioService::new(
        Arc::new(RuleEngine::default()),
        Arc::new(EnrichmentProcessor::default().with_base_dir(&dir)),
        Arc::new(DocumentLoader::new(&dir)),
    );
    service
        .load_registry(&dir.join("scenario-registry.yaml"))
        .unwrap_or_else(|e| panic!("failed to load fixture registry: {e}"));
    service
}

fn swap(notional: i64, currency: &str) -> MapRecord {
    MapRecord::typed("Swap")
        .with("tradeId", "T-1")
        .with("notional", notional)
        .with("currency", currency)
}

// ── Registry and routing ────────────────────────────────────

#[test]
fn registry_indexes_every_scenario() {
    let service = service();
    let registry = service.registry();
    assert_eq!(registry.id(), "scenario-registry");
    assert_eq!(registry.scenario_ids(), vec!["swap-processing", "bond-processing"]);
    assert_eq!(registry.data_types(), vec!["Bond", "InterestRateSwap", "Swap"]);
    assert_eq!(registry.default_scenario().unwrap().scenario_id, "bond-processing");
}

#[test]
fn routes_by_type_then_rule_then_default() {
    let service = service();
    assert_eq!(service.route_data_type("Swap").unwrap().scenario_id, "swap-processing");
    assert_eq!(service.route_data_type("InterestRateSwap").unwrap().scenario_id, "swap-processing");
    assert_eq!(service.route_data_type("CreditDefaultSwap").unwrap().scenario_id, "swap-processing");
    assert_eq!(service.route_data_type("Repo").unwrap().scenario_id, "bond-processing");
}

#[test]
fn unknown_scenario_id_is_a_routing_error() {
    let service = service();
    let err = service.process_with_scenario("fx-processing", &mut swap(1, "EUR")).unwrap_err();
    assert!(matches!(err, ScenarioError::Routing(_)));
}

// ── End-to-end execution ────────────────────────────────────

#[test]
fn valid_swap_runs_every_stage() {
    let service = service();
    let mut record = swap(5_000_000, "EUR");
    let result = service.process(&mut record, None).unwrap();

    assert_eq!(result.scenario_id, "swap-processing");
    assert_eq!(result.data_type.as_deref(), Some("Swap"));
    assert_eq!(result.status, ScenarioStatus::Successful, "{:?}", result.stage_results);
    assert_eq!(result.executed_stages(), vec!["basic-validation", "enrichment", "risk-scoring"]);
    assert!(result.skipped_stages.is_empty());

    assert_eq!(record.get("currencyName"), Some(&json!("Euro")));
    assert_eq!(record.get("currencyDecimals"), Some(&json!(2)));
    assert_eq!(result.data["currencyName"], json!("Euro"));

    let risk = result.stage("risk-scoring").unwrap();
    assert_eq!(risk.outputs["size_tier"], json!("TRIGGERED"));
}

#[test]
fn failed_basic_validation_terminates_the_swap_scenario() {
    let service = service();
    let mut record = swap(-100, "EUR");
    let result = service.process(&mut record, Some("Swap")).unwrap();

    assert_eq!(result.status, ScenarioStatus::Terminated);
    assert_eq!(result.terminated_by.as_deref(), Some("basic-validation"));
    assert_eq!(result.executed_stages(), vec!["basic-validation"]);

    let basic = result.stage("basic-validation").unwrap();
    assert_eq!(basic.outcome, StageOutcome::CriticalFailure);
    assert!(basic.message.as_deref().unwrap().starts_with("Stage execution failed"));

    assert!(!result.executed_stages().contains(&"enrichment"));
    assert_eq!(result.skipped_stages["enrichment"], "Failed dependencies: basic-validation");
    assert_eq!(result.skipped_stages["risk-scoring"], "Failed dependencies: enrichment");
    assert!(record.get("currencyName").is_none());
}

#[test]
fn unknown_currency_leaves_record_unenriched() {
    let service = service();
    let mut record = swap(10, "XXX");
    let result = service.process(&mut record, None).unwrap();

    // the lookup misses, so the optional enrichment stage fails its own rule
    let enrichment = result.stage("enrichment").unwrap();
    assert_eq!(enrichment.outcome, StageOutcome::NonCriticalFailure);
    assert_eq!(result.status, ScenarioStatus::PartialSuccess);
    assert!(record.get("currencyName").is_none());
    assert!(result.skipped_stages.contains_key("risk-scoring"));
}

#[test]
fn bond_scenario_uses_its_own_rules() {
    let service = service();
    let mut bond = MapRecord::typed("Bond").with("isin", "XS0000000001");
    let result = service.process(&mut bond, None).unwrap();
    assert_eq!(result.scenario_id, "bond-processing");
    assert!(result.is_successful());
    assert_eq!(bond.type_name(), "Bond");
}

// ── Validation and dependencies ─────────────────────────────

#[test]
fn every_fixture_document_validates() {
    for entry in walkdir::WalkDir::new(config_dir()) {
        let entry = entry.unwrap();
        if entry.path().extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let yaml = std::fs::read_to_string(entry.path()).unwrap();
        let result = validate_yaml(&yaml);
        assert!(result.is_valid(), "{}: {:?}", entry.path().display(), result.error_messages());
    }
}

#[test]
fn dependency_graph_of_the_fixture_tree() {
    let dir = config_dir();
    let analyzer = DependencyAnalyzer::new();
    let graph = analyzer.analyze(&dir.join("scenario-registry.yaml"));

    // registry, two scenarios, four rule configs, one dataset
    assert_eq!(graph.len(), 8);
    assert!(graph.nodes().all(|n| n.status == NodeStatus::Valid));
    assert!(!graph.has_cycles());
    assert_eq!(graph.max_depth(), 3);

    let dataset = dir.join("datasets/currencies.yaml");
    let impacted = graph.transitive_dependents(&dataset);
    assert!(impacted.contains(&dir.join("rules/swap-enrichment.yaml")));
    assert!(impacted.contains(&dir.join("scenarios/swap-processing.yaml")));
    assert!(impacted.contains(&dir.join("scenario-registry.yaml")));
    assert!(!impacted.contains(&dir.join("scenarios/bond-processing.yaml")));

    assert_eq!(analyzer.find_orphans(&graph, &dir), vec![dir.join("archive/legacy-limits.yaml")]);
}
