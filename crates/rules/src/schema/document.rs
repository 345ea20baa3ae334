//! Typed configuration document container and accessors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DocumentMetadata, DocumentType};
use crate::chain::RuleChain;
use crate::engine::{Category, Rule, RuleGroupDef, RuleSet};
use crate::enrichment::Enrichment;
use crate::loader::RuleError;
use crate::scenario::{RegistryEntry, RoutingConfig, ScenarioConfiguration};

/// A fully deserialized configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    pub metadata: DocumentMetadata,
    pub body: DocumentBody,
}

/// Type-specific body of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentBody {
    /// rule-config, enrichment and rule-chain documents share one shape.
    RuleConfig(RuleConfigBody),
    Scenario(ScenarioBody),
    Registry(RegistryBody),
    Dataset(DatasetBody),
    /// Types without a typed body (bootstrap, external-data-config, pipeline).
    Other(serde_yaml::Value),
}

/// Rules, groups, chains and enrichments of a rule-config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleConfigBody {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub rule_groups: Vec<RuleGroupDef>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub rule_chains: Vec<RuleChain>,
    #[serde(default)]
    pub enrichments: Vec<Enrichment>,
}

impl RuleConfigBody {
    /// Resolve groups against rules and drop disabled entries.
    pub fn rule_set(&self) -> Result<RuleSet, RuleError> {
        RuleSet::build(&self.rules, &self.rule_groups)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBody {
    pub scenario: ScenarioConfiguration,
}

/// Scenario list plus routing block of a scenario-registry document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryBody {
    #[serde(default)]
    pub scenarios: Vec<RegistryEntry>,
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
}

/// Inline lookup records of a dataset document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetBody {
    #[serde(default)]
    pub key_field: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub default_values: IndexMap<String, Value>,
}

impl ConfigDocument {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// The declared type; `None` only for documents built by hand with a bad type.
    pub fn document_type(&self) -> Option<DocumentType> {
        self.metadata.doc_type.parse().ok()
    }

    pub fn as_rule_config(&self) -> Option<&RuleConfigBody> {
        match &self.body {
            DocumentBody::RuleConfig(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_scenario(&self) -> Option<&ScenarioConfiguration> {
        match &self.body {
            DocumentBody::Scenario(body) => Some(&body.scenario),
            _ => None,
        }
    }

    pub fn as_registry(&self) -> Option<&RegistryBody> {
        match &self.body {
            DocumentBody::Registry(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&DatasetBody> {
        match &self.body {
            DocumentBody::Dataset(body) => Some(body),
            _ => None,
        }
    }
}
