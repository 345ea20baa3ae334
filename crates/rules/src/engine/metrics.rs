//! In-memory per-rule evaluation metrics.
//!
//! Keeps a bounded history of evaluations per rule (default 500) with FIFO
//! eviction, plus a summary view. `std::sync::RwLock` makes it shareable
//! across evaluation threads.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::result::ResultKind;

/// One recorded evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub timestamp: DateTime<Utc>,
    pub rule_name: String,
    pub outcome: ResultKind,
    pub elapsed_micros: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate view over a rule's retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleMetricsSummary {
    pub evaluations: usize,
    pub triggered: usize,
    pub errors: usize,
    pub average_micros: f64,
    pub max_micros: u64,
}

/// Per-rule evaluation history with FIFO eviction.
#[derive(Clone)]
pub struct RuleMetrics {
    entries: Arc<RwLock<HashMap<String, VecDeque<EvaluationRecord>>>>,
    max_entries_per_rule: usize,
}

impl RuleMetrics {
    /// Create a metrics store with the default cap of 500 records per rule.
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_rule: max.max(1),
        }
    }

    pub fn record(&self, rule_name: &str, outcome: ResultKind, elapsed_micros: u64, error: Option<String>) {
        let entry = EvaluationRecord {
            timestamp: Utc::now(),
            rule_name: rule_name.to_string(),
            outcome,
            elapsed_micros,
            error,
        };

        let mut guard = self.entries.write().expect("rule metrics lock poisoned");
        let deque = guard.entry(rule_name.to_string()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    /// Most recent records for a rule, newest first.
    pub fn recent(&self, rule_name: &str, limit: usize) -> Vec<EvaluationRecord> {
        let guard = self.entries.read().expect("rule metrics lock poisoned");
        guard
            .get(rule_name)
            .map(|d| d.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self, rule_name: &str) -> RuleMetricsSummary {
        let guard = self.entries.read().expect("rule metrics lock poisoned");
        let Some(deque) = guard.get(rule_name) else {
            return RuleMetricsSummary::default();
        };
        let evaluations = deque.len();
        let total: u64 = deque.iter().map(|e| e.elapsed_micros).sum();
        RuleMetricsSummary {
            evaluations,
            triggered: deque.iter().filter(|e| e.outcome == ResultKind::Triggered).count(),
            errors: deque.iter().filter(|e| e.outcome == ResultKind::Error).count(),
            average_micros: if evaluations == 0 { 0.0 } else { total as f64 / evaluations as f64 },
            max_micros: deque.iter().map(|e| e.elapsed_micros).max().unwrap_or(0),
        }
    }

    pub fn rule_names(&self) -> Vec<String> {
        let guard = self.entries.read().expect("rule metrics lock poisoned");
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self, rule_name: &str) {
        self.entries.write().expect("rule metrics lock poisoned").remove(rule_name);
    }
}

impl Default for RuleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction() {
        let m = RuleMetrics::with_max_entries(3);
        for i in 0..4 {
            m.record("r1", ResultKind::Triggered, i, None);
        }
        let recent = m.recent("r1", 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].elapsed_micros, 3);
        assert_eq!(recent[2].elapsed_micros, 1);
    }

    #[test]
    fn summary_counts_outcomes() {
        let m = RuleMetrics::new();
        m.record("r1", ResultKind::Triggered, 10, None);
        m.record("r1", ResultKind::NotTriggered, 20, None);
        m.record("r1", ResultKind::Error, 30, Some("boom".into()));
        let s = m.summary("r1");
        assert_eq!(s.evaluations, 3);
        assert_eq!(s.triggered, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.max_micros, 30);
        assert!((s.average_micros - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn per_rule_isolation_and_clear() {
        let m = RuleMetrics::new();
        m.record("r1", ResultKind::Triggered, 1, None);
        m.record("r2", ResultKind::Error, 1, None);
        assert_eq!(m.rule_names(), vec!["r1", "r2"]);
        m.clear("r1");
        assert_eq!(m.summary("r1"), RuleMetricsSummary::default());
        assert_eq!(m.summary("r2").errors, 1);
    }
}
