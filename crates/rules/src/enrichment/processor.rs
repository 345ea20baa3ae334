//! [`EnrichmentProcessor`]: priority-ordered, condition-gated enrichment of records.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rulekit_core::FieldAccessor;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cache::LookupCache;
use super::dataset::{key_string, DatasetFactory, LookupService, QueryConnection};
use super::error::EnrichmentError;
use super::mapping::{apply_mappings, record_bindings};
use super::types::{Enrichment, EnrichmentResult, EnrichmentType, LookupConfig};
use crate::expression::{CacheStats, ExpressionEvaluator, ExpressionService, JinjaEvaluator};

const DEFAULT_LOOKUP_TTL_SECS: u64 = 300;

/// What happened to one enrichment.
#[derive(Debug, Clone, PartialEq)]
enum Applied {
    Applied,
    Skipped(String),
}

/// Hit/miss counters of both processor caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EnrichmentCacheStats {
    pub expressions: CacheStats,
    pub lookups: CacheStats,
    pub expired_lookups: usize,
}

/// Applies lookup, calculation and field enrichments to records.
///
/// Shared across threads; the expression cache, lookup cache, service
/// registry and connection registry are all internally synchronized.
pub struct EnrichmentProcessor {
    expressions: ExpressionService,
    services: RwLock<HashMap<String, Arc<dyn LookupService>>>,
    connections: RwLock<HashMap<String, Arc<dyn QueryConnection>>>,
    lookup_cache: LookupCache,
    default_ttl: Duration,
    base_dir: Option<PathBuf>,
}

impl EnrichmentProcessor {
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            expressions: ExpressionService::new(evaluator),
            services: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            lookup_cache: LookupCache::new(),
            default_ttl: Duration::from_secs(DEFAULT_LOOKUP_TTL_SECS),
            base_dir: None,
        }
    }

    /// TTL for cached lookups whose config does not set `cache-ttl-seconds`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Directory relative dataset `file-path`s resolve against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Register a named lookup service, replacing any with the same name.
    pub fn register_service(&self, service: Arc<dyn LookupService>) {
        let name = service.name().to_string();
        self.services
            .write()
            .expect("lookup services lock poisoned")
            .insert(name, service);
    }

    pub fn register_connection(&self, name: impl Into<String>, connection: Arc<dyn QueryConnection>) {
        self.connections
            .write()
            .expect("query connections lock poisoned")
            .insert(name.into(), connection);
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .expect("lookup services lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Apply `enrichments` to `record` in ascending priority order.
    ///
    /// Failures are logged and only skip the failing enrichment.
    pub fn process(&self, enrichments: &[Enrichment], record: &mut dyn FieldAccessor) {
        self.process_with_result(enrichments, record);
    }

    /// Like [`process`](Self::process), reporting what was applied.
    pub fn process_with_result(&self, enrichments: &[Enrichment], record: &mut dyn FieldAccessor) -> EnrichmentResult {
        let mut ordered: Vec<&Enrichment> = enrichments.iter().collect();
        ordered.sort_by_key(|e| e.priority);

        let mut result = EnrichmentResult::default();
        for enrichment in ordered {
            match self.apply(enrichment, record) {
                Ok(Applied::Applied) => {
                    debug!(enrichment = %enrichment.id, "enrichment applied");
                    result.applied.push(enrichment.id.clone());
                }
                Ok(Applied::Skipped(reason)) => {
                    debug!(enrichment = %enrichment.id, reason = %reason, "enrichment skipped");
                    result.skipped.push(enrichment.id.clone());
                }
                Err(e) => {
                    warn!(enrichment = %enrichment.id, error = %e, "enrichment failed");
                    if let EnrichmentError::MissingRequiredField { target_field, .. } = &e {
                        result.missing_required_fields.push(target_field.clone());
                    }
                    result.failed.insert(enrichment.id.clone(), e.to_string());
                }
            }
        }
        info!(
            type_name = %record.type_name(),
            applied = result.applied.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            "enrichments processed"
        );
        result.record = record.to_value();
        result
    }

    /// Apply a single enrichment, honouring its enabled flag, target type and condition.
    pub fn process_one(&self, enrichment: &Enrichment, record: &mut dyn FieldAccessor) -> Result<bool, EnrichmentError> {
        self.apply(enrichment, record).map(|a| a == Applied::Applied)
    }

    fn apply(&self, enrichment: &Enrichment, record: &mut dyn FieldAccessor) -> Result<Applied, EnrichmentError> {
        if !enrichment.enabled {
            return Ok(Applied::Skipped("disabled".into()));
        }
        if let Some(target) = &enrichment.target_type {
            let actual = record.type_name();
            if !type_matches(target, &actual) {
                return Ok(Applied::Skipped(format!("target type {target} does not match {actual}")));
            }
        }
        if let Some(condition) = enrichment.condition.as_deref().filter(|c| !c.trim().is_empty()) {
            match self.expressions.evaluate_condition(condition, &record_bindings(record)) {
                Ok(true) => {}
                Ok(false) => return Ok(Applied::Skipped("condition not met".into())),
                Err(e) => {
                    warn!(enrichment = %enrichment.id, condition, error = %e, "enrichment condition failed, not applying");
                    return Ok(Applied::Skipped(format!("condition failed: {e}")));
                }
            }
        }

        match enrichment.enrichment_type {
            EnrichmentType::Lookup => self.apply_lookup(enrichment, record),
            EnrichmentType::Calculation => self.apply_calculation(enrichment, record),
            EnrichmentType::Field => {
                let source = record.to_value();
                apply_mappings(&enrichment.field_mappings, &source, record, &self.expressions)?;
                Ok(Applied::Applied)
            }
        }
    }

    fn apply_lookup(&self, enrichment: &Enrichment, record: &mut dyn FieldAccessor) -> Result<Applied, EnrichmentError> {
        let config = enrichment.lookup_config.as_ref().ok_or_else(|| EnrichmentError::Configuration {
            enrichment: enrichment.id.clone(),
            message: "lookup enrichment has no lookup-config".into(),
        })?;
        let service = self.resolve_service(&enrichment.id, config)?;

        let bindings = record_bindings(record);
        let key = self.expressions.evaluate(&config.lookup_key, &bindings)?;
        if key.is_null() {
            return Ok(Applied::Skipped("lookup key is null".into()));
        }

        let found = if config.caching_enabled() {
            let cache_key = LookupCache::key(service.name(), &key_string(&key));
            let ttl = config.ttl_seconds().map(Duration::from_secs).unwrap_or(self.default_ttl);
            self.lookup_cache
                .get_or_try_insert_with(&cache_key, ttl, || service.lookup(&key, &bindings))?
        } else {
            service.lookup(&key, &bindings)?
        };

        let Some(found) = found else {
            return Ok(Applied::Skipped(format!("no {} record for key {}", service.name(), key_string(&key))));
        };
        apply_mappings(&enrichment.field_mappings, &found, record, &self.expressions)?;
        Ok(Applied::Applied)
    }

    fn apply_calculation(&self, enrichment: &Enrichment, record: &mut dyn FieldAccessor) -> Result<Applied, EnrichmentError> {
        let config = enrichment.calculation_config.as_ref().ok_or_else(|| EnrichmentError::Configuration {
            enrichment: enrichment.id.clone(),
            message: "calculation enrichment has no calculation-config".into(),
        })?;
        let missing: Vec<&str> = config
            .dependencies
            .iter()
            .filter(|d| !record.has_field(d))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Ok(Applied::Skipped(format!("missing dependencies: {}", missing.join(", "))));
        }
        let value = self.expressions.evaluate(&config.expression, &record_bindings(record))?;
        record.set_field(&config.result_field, value)?;
        Ok(Applied::Applied)
    }

    /// A registered service by name, else the enrichment's dataset (built once).
    fn resolve_service(&self, enrichment_id: &str, config: &LookupConfig) -> Result<Arc<dyn LookupService>, EnrichmentError> {
        if let Some(name) = &config.lookup_service {
            return self
                .services
                .read()
                .expect("lookup services lock poisoned")
                .get(name)
                .cloned()
                .ok_or_else(|| EnrichmentError::LookupSource(format!("lookup service not found: {name}")));
        }
        let Some(dataset) = &config.lookup_dataset else {
            return Err(EnrichmentError::LookupSource(format!(
                "no lookup service or dataset configured for enrichment '{enrichment_id}'"
            )));
        };

        let name = DatasetFactory::service_name(enrichment_id, dataset);
        if let Some(existing) = self.services.read().expect("lookup services lock poisoned").get(&name) {
            return Ok(Arc::clone(existing));
        }
        let service = {
            let connections = self.connections.read().expect("query connections lock poisoned");
            DatasetFactory::create(enrichment_id, dataset, self.base_dir.as_deref(), &connections)?
        };
        debug!(service = %name, kind = %dataset.kind, "dataset lookup service created");
        let mut services = self.services.write().expect("lookup services lock poisoned");
        Ok(Arc::clone(services.entry(name).or_insert(service)))
    }

    pub fn cache_stats(&self) -> EnrichmentCacheStats {
        EnrichmentCacheStats {
            expressions: self.expressions.cache_stats(),
            lookups: self.lookup_cache.stats(),
            expired_lookups: self.lookup_cache.expired_entries(),
        }
    }

    /// Drop cached lookups and compiled expressions.
    pub fn clear_caches(&self) {
        self.lookup_cache.clear();
        self.expressions.clear_cache();
        info!("enrichment caches cleared");
    }
}

impl Default for EnrichmentProcessor {
    fn default() -> Self {
        Self::new(Arc::new(JinjaEvaluator::new()))
    }
}

/// Exact, simple-name or containment match of a target type against a record type.
pub(crate) fn type_matches(target: &str, actual: &str) -> bool {
    let simple = |s: &str| s.rsplit(['.', ':']).next().unwrap_or(s).to_string();
    actual == target || simple(actual) == simple(target) || simple(actual).contains(&simple(target))
}
