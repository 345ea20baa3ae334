//! Lookup sources: registered services and dataset-backed sources.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::EnrichmentError;
use super::types::{DatasetConfig, DatasetKind, QueryParameter};
use crate::expression::{to_label, Bindings};
use crate::scenario::resolve_relative;

/// A keyed source of lookup records.
pub trait LookupService: Send + Sync {
    fn name(&self) -> &str;

    /// Record for `key`, or `None` when the source has no match.
    fn lookup(&self, key: &Value, record: &Bindings) -> Result<Option<Value>, EnrichmentError>;
}

/// Executes a parameterized query for query-backed datasets.
///
/// Implementations wrap whatever client the host process uses; the crate
/// only depends on this contract.
pub trait QueryConnection: Send + Sync {
    fn query(&self, query: &str, parameters: &Bindings) -> Result<Vec<Value>, EnrichmentError>;
}

/// Canonical text form of a lookup key, so `42` and `"42"` match.
pub(crate) fn key_string(key: &Value) -> String {
    to_label(key)
}

/// Merge `defaults` into a matched record without overwriting its fields.
fn with_defaults(record: &Value, defaults: &IndexMap<String, Value>) -> Value {
    match record {
        Value::Object(map) if !defaults.is_empty() => {
            let mut merged = map.clone();
            for (k, v) in defaults {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
            Value::Object(merged)
        }
        other => other.clone(),
    }
}

// ── Inline ──────────────────────────────────────────────────────────

/// Records held in memory, indexed by key field.
pub struct InlineDataset {
    name: String,
    key_field: String,
    records: HashMap<String, Value>,
    default_values: IndexMap<String, Value>,
}

impl InlineDataset {
    pub fn new(name: impl Into<String>, key_field: impl Into<String>, data: Vec<Value>) -> Self {
        let key_field = key_field.into();
        let records = data
            .into_iter()
            .filter_map(|record| {
                let key = record.get(&key_field).map(key_string)?;
                Some((key, record))
            })
            .collect();
        Self {
            name: name.into(),
            key_field,
            records,
            default_values: IndexMap::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: IndexMap<String, Value>) -> Self {
        self.default_values = defaults;
        self
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LookupService for InlineDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &Value, _record: &Bindings) -> Result<Option<Value>, EnrichmentError> {
        Ok(self
            .records
            .get(&key_string(key))
            .map(|r| with_defaults(r, &self.default_values)))
    }
}

// ── File ────────────────────────────────────────────────────────────

/// Dataset read from a YAML/JSON or CSV file on first lookup.
pub struct FileDataset {
    name: String,
    path: PathBuf,
    kind: DatasetKind,
    key_field: String,
    default_values: IndexMap<String, Value>,
    loaded: RwLock<Option<Arc<InlineDataset>>>,
}

impl FileDataset {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: DatasetKind, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            key_field: key_field.into(),
            default_values: IndexMap::new(),
            loaded: RwLock::new(None),
        }
    }

    pub fn with_defaults(mut self, defaults: IndexMap<String, Value>) -> Self {
        self.default_values = defaults;
        self
    }

    fn dataset(&self) -> Result<Arc<InlineDataset>, EnrichmentError> {
        if let Some(ds) = self.loaded.read().expect("dataset lock poisoned").as_ref() {
            return Ok(Arc::clone(ds));
        }
        let (records, file_defaults) = match self.kind {
            DatasetKind::CsvFile => (read_csv(&self.path)?, IndexMap::new()),
            _ => read_structured(&self.path)?,
        };
        let mut defaults = file_defaults;
        defaults.extend(self.default_values.clone());
        let ds = Arc::new(
            InlineDataset::new(self.name.clone(), self.key_field.clone(), records).with_defaults(defaults),
        );
        info!(dataset = %self.name, path = %self.path.display(), records = ds.len(), "dataset loaded");
        let mut guard = self.loaded.write().expect("dataset lock poisoned");
        Ok(Arc::clone(guard.get_or_insert(ds)))
    }
}

impl LookupService for FileDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &Value, record: &Bindings) -> Result<Option<Value>, EnrichmentError> {
        self.dataset()?.lookup(key, record)
    }
}

/// A YAML or JSON file holding a record list, or a dataset document with
/// `data` and optional `default-values`.
fn read_structured(path: &Path) -> Result<(Vec<Value>, IndexMap<String, Value>), EnrichmentError> {
    let text = fs::read_to_string(path)
        .map_err(|e| EnrichmentError::Dataset(format!("cannot read {}: {e}", path.display())))?;
    let value: Value = serde_yaml::from_str(&text)
        .map_err(|e| EnrichmentError::Dataset(format!("cannot parse {}: {e}", path.display())))?;
    match value {
        Value::Array(records) => Ok((records, IndexMap::new())),
        Value::Object(mut doc) => {
            let records = match doc.remove("data") {
                Some(Value::Array(records)) => records,
                _ => {
                    return Err(EnrichmentError::Dataset(format!(
                        "{} has no 'data' list",
                        path.display()
                    )))
                }
            };
            let defaults = match doc.remove("default-values") {
                Some(Value::Object(map)) => map.into_iter().collect(),
                _ => IndexMap::new(),
            };
            Ok((records, defaults))
        }
        _ => Err(EnrichmentError::Dataset(format!("{} is not a record list", path.display()))),
    }
}

/// CSV with a header row; numeric-looking cells become numbers.
fn read_csv(path: &Path) -> Result<Vec<Value>, EnrichmentError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EnrichmentError::Dataset(format!("cannot read {}: {e}", path.display())))?;
    let headers = reader
        .headers()
        .map_err(|e| EnrichmentError::Dataset(e.to_string()))?
        .clone();
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| EnrichmentError::Dataset(format!("{}: {e}", path.display())))?;
        let mut map = Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            map.insert(header.to_string(), csv_cell(cell));
        }
        records.push(Value::Object(map));
    }
    Ok(records)
}

fn csv_cell(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(cell.to_string()),
    }
}

// ── Query ───────────────────────────────────────────────────────────

/// Dataset answered by a [`QueryConnection`] per lookup.
pub struct QueryDataset {
    name: String,
    connection: Arc<dyn QueryConnection>,
    query: String,
    parameters: Vec<QueryParameter>,
    default_values: IndexMap<String, Value>,
}

impl QueryDataset {
    pub fn new(
        name: impl Into<String>,
        connection: Arc<dyn QueryConnection>,
        query: impl Into<String>,
        parameters: Vec<QueryParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            connection,
            query: query.into(),
            parameters,
            default_values: IndexMap::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: IndexMap<String, Value>) -> Self {
        self.default_values = defaults;
        self
    }
}

impl LookupService for QueryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: &Value, record: &Bindings) -> Result<Option<Value>, EnrichmentError> {
        let mut params = Bindings::new();
        if self.parameters.is_empty() {
            params.insert("key".to_string(), key.clone());
        }
        for p in &self.parameters {
            let value = match p.field() {
                Some(field) => record.get(field).cloned().unwrap_or(Value::Null),
                None => key.clone(),
            };
            params.insert(p.name().to_string(), value);
        }
        let rows = self.connection.query(&self.query, &params)?;
        debug!(dataset = %self.name, rows = rows.len(), "query dataset lookup");
        Ok(rows.into_iter().next().map(|r| with_defaults(&r, &self.default_values)))
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// Builds lookup services from `lookup-dataset` blocks.
pub struct DatasetFactory;

impl DatasetFactory {
    /// Service name for an enrichment's dataset: `dataset-{id}-{kind}`.
    pub fn service_name(enrichment_id: &str, config: &DatasetConfig) -> String {
        format!("dataset-{}-{}", enrichment_id, config.kind)
    }

    pub fn create(
        enrichment_id: &str,
        config: &DatasetConfig,
        base_dir: Option<&Path>,
        connections: &HashMap<String, Arc<dyn QueryConnection>>,
    ) -> Result<Arc<dyn LookupService>, EnrichmentError> {
        let name = Self::service_name(enrichment_id, config);
        let invalid = |message: &str| EnrichmentError::Configuration {
            enrichment: enrichment_id.to_string(),
            message: message.to_string(),
        };
        if config.key_field.is_empty() && config.kind != DatasetKind::Database {
            return Err(invalid("lookup-dataset requires key-field"));
        }

        let service: Arc<dyn LookupService> = match config.kind {
            DatasetKind::Inline => Arc::new(
                InlineDataset::new(name, config.key_field.clone(), config.data.clone())
                    .with_defaults(config.default_values.clone()),
            ),
            DatasetKind::YamlFile | DatasetKind::CsvFile => {
                let file = config
                    .file_path
                    .as_deref()
                    .ok_or_else(|| invalid("file dataset requires file-path"))?;
                Arc::new(
                    FileDataset::new(name, resolve_relative(base_dir, file), config.kind, config.key_field.clone())
                        .with_defaults(config.default_values.clone()),
                )
            }
            DatasetKind::Database => {
                let connection_name = config
                    .connection_name
                    .as_deref()
                    .ok_or_else(|| invalid("database dataset requires connection-name"))?;
                let query = config.query.as_deref().ok_or_else(|| invalid("database dataset requires query"))?;
                let connection = connections.get(connection_name).ok_or_else(|| {
                    EnrichmentError::LookupSource(format!("no query connection named '{connection_name}'"))
                })?;
                Arc::new(
                    QueryDataset::new(name, Arc::clone(connection), query, config.parameters.clone())
                        .with_defaults(config.default_values.clone()),
                )
            }
        };
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn inline_lookup_matches_numeric_and_string_keys() {
        let ds = InlineDataset::new("ccy", "code", vec![json!({"code": 840, "name": "USD"})]);
        assert_eq!(ds.lookup(&json!("840"), &Bindings::new()).unwrap(), Some(json!({"code": 840, "name": "USD"})));
        assert_eq!(ds.lookup(&json!(999), &Bindings::new()).unwrap(), None);
    }

    #[test]
    fn defaults_fill_missing_fields_only() {
        let mut defaults = IndexMap::new();
        defaults.insert("region".to_string(), json!("GLOBAL"));
        defaults.insert("name".to_string(), json!("unknown"));
        let ds = InlineDataset::new("ccy", "code", vec![json!({"code": "EUR", "name": "Euro"})]).with_defaults(defaults);
        let hit = ds.lookup(&json!("EUR"), &Bindings::new()).unwrap().unwrap();
        assert_eq!(hit["name"], json!("Euro"));
        assert_eq!(hit["region"], json!("GLOBAL"));
    }

    #[test]
    fn yaml_file_dataset_loads_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("countries.yaml");
        fs::write(
            &path,
            "data:\n  - code: GB\n    name: United Kingdom\ndefault-values:\n  region: EMEA\n",
        )
        .unwrap();
        let ds = FileDataset::new("countries", &path, DatasetKind::YamlFile, "code");
        let hit = ds.lookup(&json!("GB"), &Bindings::new()).unwrap().unwrap();
        assert_eq!(hit["name"], json!("United Kingdom"));
        assert_eq!(hit["region"], json!("EMEA"));
    }

    #[test]
    fn csv_file_dataset_parses_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("limits.csv");
        fs::write(&path, "desk,limit\nrates,1000000\nfx,2.5\n").unwrap();
        let ds = FileDataset::new("limits", &path, DatasetKind::CsvFile, "desk");
        assert_eq!(ds.lookup(&json!("rates"), &Bindings::new()).unwrap().unwrap()["limit"], json!(1000000));
        assert_eq!(ds.lookup(&json!("fx"), &Bindings::new()).unwrap().unwrap()["limit"], json!(2.5));
    }

    #[test]
    fn missing_file_is_a_dataset_error() {
        let ds = FileDataset::new("nope", "/definitely/not/here.yaml", DatasetKind::YamlFile, "id");
        assert!(matches!(ds.lookup(&json!(1), &Bindings::new()), Err(EnrichmentError::Dataset(_))));
    }

    struct CountingConnection(AtomicUsize);

    impl QueryConnection for CountingConnection {
        fn query(&self, _query: &str, parameters: &Bindings) -> Result<Vec<Value>, EnrichmentError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![json!({"lei": parameters["lei"], "rating": "AA"})])
        }
    }

    #[test]
    fn factory_builds_named_services() {
        let config: DatasetConfig = serde_yaml::from_str(
            "type: database\nconnection-name: refdata\nquery: select * from cpty where lei = :lei\nparameters: [lei]\n",
        )
        .unwrap();
        let mut connections: HashMap<String, Arc<dyn QueryConnection>> = HashMap::new();
        connections.insert("refdata".into(), Arc::new(CountingConnection(AtomicUsize::new(0))));

        let service = DatasetFactory::create("cpty-rating", &config, None, &connections).unwrap();
        assert_eq!(service.name(), "dataset-cpty-rating-database");
        let hit = service.lookup(&json!("LEI-1"), &Bindings::new()).unwrap().unwrap();
        assert_eq!(hit["lei"], json!("LEI-1"));

        assert!(matches!(
            DatasetFactory::create("cpty-rating", &config, None, &HashMap::new()),
            Err(EnrichmentError::LookupSource(_))
        ));
    }
}
