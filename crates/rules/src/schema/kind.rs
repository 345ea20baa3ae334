//! Document type enum for two-pass deserialization dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported configuration document types (`metadata.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Scenario,
    ScenarioRegistry,
    Bootstrap,
    RuleConfig,
    Dataset,
    Enrichment,
    RuleChain,
    ExternalDataConfig,
    Pipeline,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::Scenario,
        DocumentType::ScenarioRegistry,
        DocumentType::Bootstrap,
        DocumentType::RuleConfig,
        DocumentType::Dataset,
        DocumentType::Enrichment,
        DocumentType::RuleChain,
        DocumentType::ExternalDataConfig,
        DocumentType::Pipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Scenario => "scenario",
            DocumentType::ScenarioRegistry => "scenario-registry",
            DocumentType::Bootstrap => "bootstrap",
            DocumentType::RuleConfig => "rule-config",
            DocumentType::Dataset => "dataset",
            DocumentType::Enrichment => "enrichment",
            DocumentType::RuleChain => "rule-chain",
            DocumentType::ExternalDataConfig => "external-data-config",
            DocumentType::Pipeline => "pipeline",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(DocumentType::as_str).collect()
    }

    /// Metadata fields required in addition to id/name/version/description/type.
    pub fn required_metadata(&self) -> &'static [&'static str] {
        match self {
            DocumentType::Scenario => &["business-domain", "owner"],
            DocumentType::ScenarioRegistry => &["created-by"],
            DocumentType::RuleConfig
            | DocumentType::Enrichment
            | DocumentType::RuleChain
            | DocumentType::ExternalDataConfig
            | DocumentType::Pipeline => &["author"],
            DocumentType::Dataset => &["source"],
            DocumentType::Bootstrap => &[],
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown document type: '{}'", s))
    }
}
