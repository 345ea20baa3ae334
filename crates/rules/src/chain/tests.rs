//! Tests for the chain pattern executors.

use std::sync::Arc;

use serde_json::{json, Value};

use super::*;
use crate::engine::{RuleEngine, Severity};

fn executor() -> RuleChainExecutor {
    RuleChainExecutor::new(Arc::new(RuleEngine::default()))
}

fn chain(pattern: ChainPattern, configuration: Value) -> RuleChain {
    RuleChain::new("test-chain", pattern, configuration)
}

fn context(vars: Value) -> ChainContext {
    ChainContext::from_bindings(vars.as_object().cloned().unwrap_or_default())
}

// ── Dispatcher ──────────────────────────────────────────────────────

#[test]
fn disabled_chain_fails_without_running() {
    let mut c = chain(ChainPattern::ConditionalChaining, json!({}));
    c.enabled = false;
    let result = executor().execute(&c, &mut ChainContext::new());
    assert!(!result.successful);
    assert_eq!(result.error_message.as_deref(), Some("Rule chain 'test-chain' is disabled"));
    assert!(result.executed_rules.is_empty());
}

#[test]
fn invalid_configuration_is_reported_before_execution() {
    let c = chain(ChainPattern::ConditionalChaining, json!({"trigger-rule": {"condition": "x > 1"}}));
    let result = executor().execute(&c, &mut context(json!({"x": 5})));
    assert!(!result.successful);
    let message = result.error_message.unwrap_or_default();
    assert!(message.starts_with("Invalid conditional-chaining configuration"), "{message}");
}

#[test]
fn execute_all_runs_in_priority_order() {
    let mut late = chain(ChainPattern::SequentialDependency, json!({
        "stages": [{"stage": 1, "rule": {"condition": "base * 2"}, "output-variable": "doubled"}]
    }));
    late.id = "late".into();
    late.priority = 200;
    let mut early = chain(ChainPattern::SequentialDependency, json!({
        "stages": [{"stage": 1, "rule": {"condition": "base + 1"}, "output-variable": "bumped"}]
    }));
    early.id = "early".into();
    early.priority = 10;

    let results = executor().execute_all(&[late, early], &mut context(json!({"base": 3})));
    let ids: Vec<_> = results.iter().map(|r| r.chain_id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
}

#[test]
fn validate_chain_prefixes_configuration_paths() {
    let c = chain(ChainPattern::SequentialDependency, json!({"stages": []}));
    let result = validate_chain(&c);
    assert!(!result.is_valid());
    assert_eq!(result.errors[0].path, "configuration.stages");
}

// ── Conditional chaining ────────────────────────────────────────────

fn conditional() -> RuleChain {
    chain(ChainPattern::ConditionalChaining, json!({
        "trigger-rule": {"id": "large-trade", "condition": "amount > 1000000"},
        "conditional-rules": {
            "on-trigger": [
                {"id": "needs-approval", "condition": "approved"},
                {"id": "known-counterparty", "condition": "counterparty != ''"}
            ],
            "on-no-trigger": [{"id": "standard-check", "condition": "amount > 0"}]
        }
    }))
}

#[test]
fn conditional_runs_on_trigger_branch() {
    let mut ctx = context(json!({"amount": 5000000, "approved": false, "counterparty": "ACME"}));
    let result = executor().execute(&conditional(), &mut ctx);
    assert!(result.successful);
    assert_eq!(result.final_outcome.as_deref(), Some("TRIGGERED"));
    assert_eq!(result.stage_result("triggerResult"), Some(&json!(true)));
    assert_eq!(result.stage_result("needs-approval_result"), Some(&json!(false)));
    assert_eq!(result.stage_result("known-counterparty_result"), Some(&json!(true)));
    assert_eq!(result.stage_result("conditionalRulesExecuted"), Some(&json!(2)));
    assert_eq!(ctx.stage_result("triggerResult"), Some(&json!(true)));
}

#[test]
fn conditional_runs_on_no_trigger_branch() {
    let result = executor().execute(&conditional(), &mut context(json!({"amount": 10})));
    assert_eq!(result.final_outcome.as_deref(), Some("NOT_TRIGGERED"));
    assert_eq!(result.stage_result("standard-check_result"), Some(&json!(true)));
    assert!(result.stage_result("needs-approval_result").is_none());
}

#[test]
fn conditional_trigger_error_fails_chain() {
    let result = executor().execute(&conditional(), &mut context(json!({"other": 1})));
    assert!(!result.successful);
    let message = result.error_message.unwrap_or_default();
    assert!(message.starts_with("Trigger rule evaluation failed"), "{message}");
}

// ── Sequential dependency ───────────────────────────────────────────

#[test]
fn sequential_threads_outputs_between_stages() {
    let c = chain(ChainPattern::SequentialDependency, json!({
        "stages": [
            {"stage": 2, "name": "classify", "depends-on": ["exposure"],
             "rule": {"condition": "'HIGH' if exposure > 500 else 'LOW'"}, "output-variable": "tier"},
            {"stage": 1, "name": "exposure",
             "rule": {"condition": "notional * rate"}, "output-variable": "exposure"}
        ]
    }));
    let mut ctx = context(json!({"notional": 1000, "rate": 0.75}));
    let result = executor().execute(&c, &mut ctx);
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.final_outcome.as_deref(), Some("HIGH"));
    assert_eq!(result.stage_result("stage_1_result"), Some(&json!(750.0)));
    assert_eq!(ctx.get("tier"), Some(&json!("HIGH")));
    assert_eq!(result.execution_path, vec!["exposure", "classify"]);
}

#[test]
fn sequential_missing_dependency_fails() {
    let c = chain(ChainPattern::SequentialDependency, json!({
        "stages": [{"stage": 1, "name": "score", "depends-on": ["riskScore"],
                    "rule": {"condition": "riskScore * 2"}}]
    }));
    let result = executor().execute(&c, &mut ChainContext::new());
    assert!(!result.successful);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Stage 1 (score) is missing dependencies: riskScore")
    );
}

#[test]
fn sequential_rejects_duplicate_stage_numbers() {
    let c = chain(ChainPattern::SequentialDependency, json!({
        "stages": [
            {"stage": 1, "rule": {"condition": "1"}},
            {"stage": 1, "rule": {"condition": "2"}}
        ]
    }));
    assert!(!executor().validate(&c).is_valid());
}

// ── Result-based routing ────────────────────────────────────────────

fn routing() -> RuleChain {
    chain(ChainPattern::ResultBasedRouting, json!({
        "router-rule": {"id": "tier", "condition": "'HIGH' if amount > 1000 else 'LOW'", "output-variable": "tier"},
        "routes": {
            "HIGH": {"rules": [
                {"id": "dual-sign", "condition": "signatures >= 2"},
                {"id": "limit", "condition": "amount < 1000000"}
            ]},
            "LOW": {"rules": []}
        }
    }))
}

#[test]
fn routing_executes_selected_route() {
    let mut ctx = context(json!({"amount": 5000, "signatures": 1}));
    let result = executor().execute(&routing(), &mut ctx);
    assert!(result.successful);
    assert_eq!(result.final_outcome.as_deref(), Some("ROUTE_HIGH_COMPLETED"));
    assert_eq!(result.stage_result("routeKey"), Some(&json!("HIGH")));
    assert_eq!(result.stage_result("routeExecutionResult"), Some(&json!("COMPLETED")));
    assert_eq!(result.stage_result("routeExecutedRules"), Some(&json!(2)));
    assert_eq!(result.stage_result("routeTriggeredRules"), Some(&json!(1)));
    assert_eq!(ctx.get("tier"), Some(&json!("HIGH")));
}

#[test]
fn routing_route_without_rules() {
    let result = executor().execute(&routing(), &mut context(json!({"amount": 5, "signatures": 0})));
    assert_eq!(result.final_outcome.as_deref(), Some("ROUTE_LOW_COMPLETED"));
    assert_eq!(result.stage_result("routeExecutionResult"), Some(&json!("NO_RULES_CONFIGURED")));
}

#[test]
fn routing_unknown_route() {
    let c = chain(ChainPattern::ResultBasedRouting, json!({
        "router-rule": {"condition": "'MEDIUM'"},
        "routes": {"HIGH": {"rules": [{"condition": "true"}]}}
    }));
    let result = executor().execute(&c, &mut ChainContext::new());
    assert_eq!(result.final_outcome.as_deref(), Some("ROUTE_MEDIUM_COMPLETED"));
    assert_eq!(result.stage_result("routeExecutionResult"), Some(&json!("NO_RULES_FOR_ROUTE")));
}

// ── Accumulative chaining ───────────────────────────────────────────

fn weighted(weights: &[f64]) -> Vec<AccumulationRule> {
    weights
        .iter()
        .enumerate()
        .map(|(i, w)| AccumulationRule::new(format!("r{i}"), "true", *w))
        .collect()
}

#[test]
fn top_weighted_keeps_heaviest_rules() {
    let rules = weighted(&[5.0, 1.0, 3.0]);
    let selection = RuleSelection {
        strategy: Some("top-weighted".into()),
        max_rules: Some(2),
        ..Default::default()
    };
    let picked = select_rules(Some(&selection), &rules, |_| Ok(None));
    let weights: Vec<f64> = picked.iter().map(|r| r.weight).collect();
    assert_eq!(weights, vec![5.0, 3.0]);
}

#[test]
fn top_weighted_chain_sums_selected_weights() {
    let c = chain(ChainPattern::AccumulativeChaining, json!({
        "accumulator-variable": "riskScore",
        "accumulation-rules": [
            {"id": "a", "condition": "true", "weight": 5},
            {"id": "b", "condition": "true", "weight": 1},
            {"id": "c", "condition": "true", "weight": 3}
        ],
        "rule-selection": {"strategy": "top-weighted", "max-rules": 2},
        "final-decision-rule": {"condition": "'REVIEW' if riskScore >= 8 else 'PASS'"}
    }));
    let mut ctx = ChainContext::new();
    let result = executor().execute(&c, &mut ctx);
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.stage_result("riskScore_final"), Some(&json!(8.0)));
    assert_eq!(result.stage_result("rules_selected_for_execution"), Some(&json!(2)));
    assert_eq!(result.stage_result("component_1_a_weighted"), Some(&json!(5.0)));
    assert_eq!(result.final_outcome.as_deref(), Some("REVIEW"));
    assert_eq!(ctx.get("riskScore"), Some(&json!(8.0)));
}

#[test]
fn priority_based_filters_and_orders() {
    let rules = vec![
        AccumulationRule::new("low", "true", 9.0).with_priority("LOW"),
        AccumulationRule::new("medium", "true", 4.0).with_priority("MEDIUM"),
        AccumulationRule::new("high-light", "true", 1.0).with_priority("HIGH"),
        AccumulationRule::new("high-heavy", "true", 2.0).with_priority("HIGH"),
    ];
    let selection = RuleSelection {
        strategy: Some("priority-based".into()),
        min_priority: Some("MEDIUM".into()),
        ..Default::default()
    };
    let picked = select_rules(Some(&selection), &rules, |_| Ok(None));
    let ids: Vec<_> = picked.iter().map(|r| r.label(0)).collect();
    assert_eq!(ids, vec!["high-heavy", "high-light", "medium"]);
}

#[test]
fn dynamic_threshold_falls_back() {
    let rules = weighted(&[0.2, 0.6, 1.5]);
    let selection = RuleSelection {
        strategy: Some("dynamic-threshold".into()),
        threshold_expression: Some("cutoff".into()),
        ..Default::default()
    };
    // null threshold uses the 0.5 default
    assert_eq!(select_rules(Some(&selection), &rules, |_| Ok(None)).len(), 2);
    assert_eq!(select_rules(Some(&selection), &rules, |_| Ok(Some(1.0))).len(), 1);
    // evaluation failure selects everything
    assert_eq!(select_rules(Some(&selection), &rules, |_| Err("boom".into())).len(), 3);
}

#[test]
fn weight_threshold_keeps_rules_at_or_above_cutoff() {
    let rules = weighted(&[0.2, 1.0, 1.5]);
    let selection = RuleSelection {
        strategy: Some("weight-threshold".into()),
        weight_threshold: Some(1.0),
        ..Default::default()
    };
    let picked = select_rules(Some(&selection), &rules, |_| Ok(None));
    let weights: Vec<f64> = picked.iter().map(|r| r.weight).collect();
    assert_eq!(weights, vec![1.0, 1.5]);
}

#[test]
fn weight_threshold_chain_skips_light_rules() {
    let c = chain(ChainPattern::AccumulativeChaining, json!({
        "accumulation-rules": [
            {"id": "light", "condition": "true", "weight": 0.25},
            {"id": "heavy", "condition": "true", "weight": 2}
        ],
        "rule-selection": {"strategy": "weight-threshold", "weight-threshold": 1.0}
    }));
    let result = executor().execute(&c, &mut ChainContext::new());
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.stage_result("rules_selected_for_execution"), Some(&json!(1)));
    assert_eq!(result.stage_result("totalScore_final"), Some(&json!(2.0)));
    assert_eq!(result.executed_rules.len(), 1);
    assert_eq!(result.executed_rules[0].rule_name, "heavy");
}

fn dynamic_chain(threshold_expression: &str) -> RuleChain {
    chain(ChainPattern::AccumulativeChaining, json!({
        "initial-value": 2,
        "accumulation-rules": [
            {"id": "small", "condition": "true", "weight": 0.2},
            {"id": "medium", "condition": "true", "weight": 0.6},
            {"id": "large", "condition": "true", "weight": 1.5}
        ],
        "rule-selection": {"strategy": "dynamic-threshold", "threshold-expression": threshold_expression}
    }))
}

#[test]
fn dynamic_threshold_reads_context_and_accumulator() {
    // cutoff 1.0 * (initial 2 / 2) keeps only the 1.5 rule
    let mut ctx = context(json!({"cutoff": 1.0}));
    let result = executor().execute(&dynamic_chain("cutoff * (totalScore / 2)"), &mut ctx);
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.stage_result("rules_selected_for_execution"), Some(&json!(1)));
    assert_eq!(result.stage_result("totalScore_final"), Some(&json!(3.5)));
    assert_eq!(result.executed_rules[0].rule_name, "large");
}

#[test]
fn dynamic_threshold_chain_fallbacks() {
    // non-numeric and null thresholds use 0.5
    for expression in ["'high'", "none"] {
        let result = executor().execute(&dynamic_chain(expression), &mut ChainContext::new());
        assert!(result.successful, "{:?}", result.error_message);
        assert_eq!(result.stage_result("rules_selected_for_execution"), Some(&json!(2)), "{expression}");
    }
    // a failing threshold expression selects every rule
    let result = executor().execute(&dynamic_chain("undefined_cutoff * 2"), &mut ChainContext::new());
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.stage_result("rules_selected_for_execution"), Some(&json!(3)));
}

#[test]
fn final_decision_labels_null_and_errors() {
    let decide = |condition: &str| {
        let c = chain(ChainPattern::AccumulativeChaining, json!({
            "accumulation-rules": [{"id": "a", "condition": "true", "weight": 1}],
            "final-decision-rule": {"condition": condition}
        }));
        executor().execute(&c, &mut ChainContext::new())
    };

    let unknown = decide("none");
    assert!(unknown.successful);
    assert_eq!(unknown.final_outcome.as_deref(), Some("UNKNOWN"));
    assert_eq!(unknown.stage_result("finalDecision"), Some(&json!("UNKNOWN")));

    let broken = decide("missing_threshold > totalScore");
    assert!(broken.successful);
    assert_eq!(broken.final_outcome.as_deref(), Some("ERROR"));
}

#[test]
fn accumulation_rule_error_contributes_zero() {
    let c = chain(ChainPattern::AccumulativeChaining, json!({
        "accumulation-rules": [
            {"id": "ok", "condition": "10", "weight": 0.5},
            {"id": "broken", "condition": "missing_value * 2", "weight": 1}
        ]
    }));
    let result = executor().execute(&c, &mut ChainContext::new());
    assert!(result.successful);
    assert_eq!(result.stage_result("totalScore_final"), Some(&json!(5.0)));
    assert_eq!(result.final_outcome.as_deref(), Some("ACCUMULATION_COMPLETED"));
    assert!(result.executed_rules[1].is_error());
}

// ── Complex workflow ────────────────────────────────────────────────

fn workflow(second_failure_action: &str) -> RuleChain {
    chain(ChainPattern::ComplexWorkflow, json!({
        "stages": [
            {"stage": "screening", "rules": [{"id": "kyc", "condition": "kyc_passed"}],
             "failure-action": second_failure_action},
            {"stage": "pricing", "depends-on": ["screening"],
             "rules": [{"id": "price", "condition": "price * quantity"}],
             "output-variable": "notional"},
            {"stage": "booking", "depends-on": ["pricing"],
             "conditional-execution": {
                 "condition": "notional > 1000",
                 "on-true": {"rules": [{"id": "large-booking", "condition": "desk == 'rates'"}]},
                 "on-false": [{"id": "small-booking", "condition": "true"}]
             }}
        ]
    }))
}

#[test]
fn workflow_runs_stages_in_dependency_order() {
    let mut ctx = context(json!({"kyc_passed": true, "price": 50, "quantity": 40, "desk": "rates"}));
    let result = executor().execute(&workflow("continue"), &mut ctx);
    assert!(result.successful, "{:?}", result.error_message);
    assert_eq!(result.final_outcome.as_deref(), Some("COMPLEX_WORKFLOW_COMPLETED"));
    assert_eq!(result.stage_result("stage_screening_result"), Some(&json!("SUCCESS")));
    assert_eq!(result.stage_result("notional"), Some(&json!(2000)));
    assert_eq!(result.stage_result("stage_booking_result"), Some(&json!("SUCCESS")));
    assert!(result.executed_rules.iter().any(|r| r.rule_name == "large-booking"));
}

#[test]
fn workflow_skips_dependents_of_failed_stage() {
    let mut ctx = context(json!({"kyc_passed": false, "price": 1, "quantity": 1, "desk": "fx"}));
    let result = executor().execute(&workflow("continue"), &mut ctx);
    assert!(result.successful);
    assert_eq!(result.stage_result("stage_screening_result"), Some(&json!("FAILED")));
    assert_eq!(result.stage_result("stage_pricing_result"), Some(&json!("SKIPPED")));
    assert_eq!(result.stage_result("stage_booking_result"), Some(&json!("SKIPPED")));
}

#[test]
fn workflow_terminate_action_fails_chain() {
    let mut ctx = context(json!({"kyc_passed": false}));
    let result = executor().execute(&workflow("terminate"), &mut ctx);
    assert!(!result.successful);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Stage 'screening' failed with terminate action")
    );
    assert!(result.stage_result("stage_pricing_result").is_none());
}

#[test]
fn workflow_validation_catches_cycles_and_unknown_stages() {
    let c = chain(ChainPattern::ComplexWorkflow, json!({
        "stages": [
            {"stage": 1, "depends-on": ["2"], "rules": [{"condition": "true"}]},
            {"stage": 2, "depends-on": ["1", "ghost"], "rules": [{"condition": "true"}],
             "failure-action": "retry"}
        ]
    }));
    let messages = executor().validate(&c).error_messages().join("\n");
    assert!(messages.contains("unknown stage 'ghost'"), "{messages}");
    assert!(messages.contains("'retry' must be"), "{messages}");
    assert!(messages.contains("circular dependency"), "{messages}");
}

// ── Fluent builder ──────────────────────────────────────────────────

fn fluent() -> RuleChain {
    FluentChainBuilder::new("approval-flow")
        .name("Approval flow")
        .root(
            FluentNode::rule("high-value", "amount > 10000")
                .severity(Severity::Warning)
                .on_success(
                    FluentNode::rule("senior-approval", "approver_level >= 3")
                        .on_failure(FluentNode::rule("escalate", "true").message("Escalated")),
                )
                .on_failure(FluentNode::rule("auto-approve", "true")),
        )
        .build()
        .expect("root rule set")
}

#[test]
fn fluent_builder_produces_fluent_chain() {
    let c = fluent();
    assert_eq!(c.pattern, ChainPattern::FluentBuilder);
    assert_eq!(c.display_name(), "Approval flow");
    assert!(c.configuration.get("root-rule").is_some());
    assert!(validate_chain(&c).is_valid());
    assert!(FluentChainBuilder::new("empty").build().is_err());
}

#[test]
fn fluent_walks_success_then_failure_branch() {
    let mut ctx = context(json!({"amount": 50000, "approver_level": 1}));
    let result = executor().execute(&fluent(), &mut ctx);
    assert!(result.successful);
    assert_eq!(result.final_outcome.as_deref(), Some("escalate"));
    assert_eq!(result.stage_result("high-value_result"), Some(&json!(true)));
    assert_eq!(result.stage_result("senior-approval_result"), Some(&json!(false)));
    assert_eq!(result.stage_result("terminalTriggered"), Some(&json!(true)));
    assert_eq!(result.execution_path, vec!["high-value", "senior-approval", "escalate"]);
}

#[test]
fn fluent_yaml_configuration_runs_the_same_way() {
    let yaml = r#"
id: small-trades
pattern: fluent-builder
configuration:
  root-rule:
    id: high-value
    condition: amount > 10000
    on-failure:
      rule:
        id: auto-approve
        condition: "true"
"#;
    let c: RuleChain = serde_yaml::from_str(yaml).unwrap();
    let result = executor().execute(&c, &mut context(json!({"amount": 5})));
    assert_eq!(result.final_outcome.as_deref(), Some("auto-approve"));
}
