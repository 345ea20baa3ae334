//! Enrichment definitions as written in rule-config and enrichment documents.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::default_true;

fn default_priority() -> i32 {
    100
}

/// What an enrichment does to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrichmentType {
    /// Fetch a record from a lookup source and map its fields.
    #[serde(alias = "lookup-enrichment")]
    Lookup,
    /// Evaluate an expression into a result field.
    #[serde(alias = "calculation-enrichment")]
    Calculation,
    /// Map fields of the record onto itself.
    #[serde(alias = "field-enrichment")]
    Field,
}

impl EnrichmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentType::Lookup => "lookup",
            EnrichmentType::Calculation => "calculation",
            EnrichmentType::Field => "field",
        }
    }
}

impl fmt::Display for EnrichmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Enrichment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub enrichment_type: EnrichmentType,
    /// Record type this enrichment applies to; absent means every record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower numbers apply first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Gate expression; false or an evaluation error skips the enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_config: Option<LookupConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_config: Option<CalculationConfig>,
}

impl Enrichment {
    pub fn new(id: impl Into<String>, enrichment_type: EnrichmentType) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: None,
            enrichment_type,
            target_type: None,
            enabled: true,
            priority: default_priority(),
            condition: None,
            field_mappings: Vec::new(),
            lookup_config: None,
            calculation_config: None,
        }
    }

    /// Calculation enrichment writing `expression` into `result_field`.
    pub fn calculation(id: impl Into<String>, expression: impl Into<String>, result_field: impl Into<String>) -> Self {
        let mut e = Self::new(id, EnrichmentType::Calculation);
        e.calculation_config = Some(CalculationConfig {
            expression: expression.into(),
            result_field: result_field.into(),
            dependencies: Vec::new(),
        });
        e
    }

    /// Lookup enrichment against `config`, mapping fields with `mappings`.
    pub fn lookup(id: impl Into<String>, config: LookupConfig, mappings: Vec<FieldMapping>) -> Self {
        let mut e = Self::new(id, EnrichmentType::Lookup);
        e.lookup_config = Some(config);
        e.field_mappings = mappings;
        e
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mappings.push(mapping);
        self
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Copy of one field from a source onto the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    /// Expression applied to the value, which is bound as `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    pub fn new(source_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            transformation: None,
            default_value: None,
            required: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_transformation(mut self, expression: impl Into<String>) -> Self {
        self.transformation = Some(expression.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Where a lookup enrichment gets its data and how the key is derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LookupConfig {
    /// Name of a registered lookup service. Takes precedence over `lookup-dataset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_dataset: Option<DatasetConfig>,
    /// Expression producing the lookup key from the record.
    #[serde(default)]
    pub lookup_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
}

impl LookupConfig {
    pub fn service(name: impl Into<String>, lookup_key: impl Into<String>) -> Self {
        Self {
            lookup_service: Some(name.into()),
            lookup_key: lookup_key.into(),
            ..Default::default()
        }
    }

    pub fn dataset(dataset: DatasetConfig, lookup_key: impl Into<String>) -> Self {
        Self {
            lookup_dataset: Some(dataset),
            lookup_key: lookup_key.into(),
            ..Default::default()
        }
    }

    pub fn cached(mut self, ttl_seconds: u64) -> Self {
        self.cache_enabled = Some(true);
        self.cache_ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Caching applies when either this block or its dataset enables it.
    pub fn caching_enabled(&self) -> bool {
        self.cache_enabled
            .or_else(|| self.lookup_dataset.as_ref().and_then(|d| d.cache_enabled))
            .unwrap_or(false)
    }

    pub fn ttl_seconds(&self) -> Option<u64> {
        self.cache_ttl_seconds
            .or_else(|| self.lookup_dataset.as_ref().and_then(|d| d.cache_ttl_seconds))
    }
}

/// Source kind of a dataset-backed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetKind {
    Inline,
    #[serde(alias = "file", alias = "json-file")]
    YamlFile,
    CsvFile,
    #[serde(alias = "query")]
    Database,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Inline => "inline",
            DatasetKind::YamlFile => "yaml-file",
            DatasetKind::CsvFile => "csv-file",
            DatasetKind::Database => "database",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `lookup-dataset` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetConfig {
    #[serde(rename = "type")]
    pub kind: DatasetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub key_field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub default_values: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Query parameter names; the lookup key is bound to each.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<QueryParameter>,
}

impl DatasetConfig {
    pub fn inline(key_field: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            kind: DatasetKind::Inline,
            file_path: None,
            key_field: key_field.into(),
            data,
            default_values: IndexMap::new(),
            cache_enabled: None,
            cache_ttl_seconds: None,
            connection_name: None,
            query: None,
            parameters: Vec::new(),
        }
    }
}

/// A named query parameter. Written either as a bare name or `{name, field}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParameter {
    Name(String),
    Mapped {
        name: String,
        #[serde(default)]
        field: Option<String>,
    },
}

impl QueryParameter {
    pub fn name(&self) -> &str {
        match self {
            QueryParameter::Name(name) | QueryParameter::Mapped { name, .. } => name,
        }
    }

    /// Record field supplying the value; `None` binds the lookup key.
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryParameter::Name(_) => None,
            QueryParameter::Mapped { field, .. } => field.as_deref(),
        }
    }
}

/// `calculation-config` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CalculationConfig {
    pub expression: String,
    pub result_field: String,
    /// Fields the expression reads; missing ones skip the calculation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Per-run outcome of [`EnrichmentProcessor::process_with_result`](super::EnrichmentProcessor::process_with_result).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentResult {
    /// Snapshot of the record after every applied enrichment.
    pub record: Value,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    /// Enrichment id → failure message.
    pub failed: IndexMap<String, String>,
    /// Target fields of required mappings whose source value was absent.
    pub missing_required_fields: Vec<String>,
}

impl EnrichmentResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
