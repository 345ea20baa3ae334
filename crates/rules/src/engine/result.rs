//! Per-evaluation result objects.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::Severity;

/// Discriminator for a [`RuleResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Triggered,
    NotTriggered,
    Error,
}

/// Timing captured for a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvaluationTiming {
    pub elapsed_micros: u64,
}

/// Outcome of evaluating one rule, group or rule list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub kind: ResultKind,
    pub rule_name: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<EvaluationTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure_messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl RuleResult {
    fn build(kind: ResultKind, rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            rule_name: rule_name.into(),
            message: message.into(),
            severity: Severity::default(),
            timing: None,
            cause: None,
            failure_messages: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn triggered(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(ResultKind::Triggered, rule_name, message)
    }

    pub fn not_triggered(rule_name: impl Into<String>) -> Self {
        Self::build(ResultKind::NotTriggered, rule_name, "")
    }

    /// Result of a rule list in which nothing matched.
    pub fn no_match() -> Self {
        Self::build(ResultKind::NotTriggered, "no-match", "No matching rules found")
    }

    pub fn error(rule_name: impl Into<String>, message: impl Into<String>, cause: Option<String>) -> Self {
        let mut result = Self::build(ResultKind::Error, rule_name, message);
        result.cause = cause;
        result
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_elapsed_micros(mut self, elapsed_micros: u64) -> Self {
        self.timing = Some(EvaluationTiming { elapsed_micros });
        self
    }

    pub fn is_triggered(&self) -> bool {
        self.kind == ResultKind::Triggered
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Error
    }
}

/// Outcome of evaluating every rule and group of a [`RuleSet`](super::RuleSet).
#[derive(Debug, Clone, Serialize)]
pub struct RuleSetOutcome {
    pub results: Vec<RuleResult>,
    /// Messages of blocking failures (errors and untriggered ERROR/CRITICAL rules).
    pub failures: Vec<String>,
    /// Messages of non-blocking failures (untriggered INFO/WARNING rules).
    pub warnings: Vec<String>,
}

impl RuleSetOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn triggered(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.iter().filter(|r| r.is_triggered())
    }

    /// Collapse into a single result for reporting.
    pub fn summary(&self, name: &str) -> RuleResult {
        let triggered = self.triggered().count();
        let mut result = if self.is_success() {
            RuleResult::triggered(name, format!("{} of {} rules passed", triggered, self.results.len()))
        } else {
            let severity = self
                .results
                .iter()
                .filter(|r| !r.is_triggered())
                .map(|r| r.severity)
                .max()
                .unwrap_or_default();
            RuleResult::not_triggered(name)
                .with_message(format!("{} blocking rule failure(s)", self.failures.len()))
                .with_severity(severity)
        };
        result.failure_messages = self.failures.clone();
        result
    }
}
