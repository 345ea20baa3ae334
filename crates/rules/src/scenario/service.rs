//! [`ScenarioService`]: routes records to scenarios and runs them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rulekit_core::{Config, FieldAccessor, MapRecord};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{Result, ScenarioError};
use super::model::ScenarioConfiguration;
use super::registry::ScenarioRegistry;
use super::result::ScenarioExecutionResult;
use super::runner::StageRunner;
use crate::engine::RuleEngine;
use crate::enrichment::EnrichmentProcessor;
use crate::expression::{Bindings, JinjaEvaluator};
use crate::loader::DocumentLoader;

/// Entry point for processing records by data type.
///
/// The registry is swapped wholesale on reload; readers keep the `Arc` they
/// routed with for the rest of their execution.
pub struct ScenarioService {
    registry: RwLock<Arc<ScenarioRegistry>>,
    registry_path: RwLock<Option<PathBuf>>,
    loader: Arc<DocumentLoader>,
    runner: StageRunner,
}

impl ScenarioService {
    pub fn new(engine: Arc<RuleEngine>, enrichment: Arc<EnrichmentProcessor>, loader: Arc<DocumentLoader>) -> Self {
        Self {
            registry: RwLock::new(Arc::new(ScenarioRegistry::default())),
            registry_path: RwLock::new(None),
            runner: StageRunner::new(engine, enrichment, Arc::clone(&loader)),
            loader,
        }
    }

    /// Wire an engine, enrichment processor and loader from `config`.
    ///
    /// The registry is not loaded; call [`load_registry`](Self::load_registry).
    /// With `documents.watch` set, the loader re-parses changed files.
    pub fn from_config(config: &Config) -> Self {
        let evaluator = Arc::new(JinjaEvaluator::new());
        let engine = RuleEngine::new(evaluator.clone()).with_metrics_capacity(config.engine.metrics_capacity);
        let enrichment = EnrichmentProcessor::new(evaluator)
            .with_default_ttl(Duration::from_secs(config.enrichment.lookup_cache_ttl_secs))
            .with_base_dir(&config.documents.config_dir);
        let mut loader = DocumentLoader::new(&config.documents.config_dir);
        if config.documents.watch {
            if let Err(e) = loader.watch() {
                warn!(error = %e, "hot reload disabled");
            }
        }
        Self::new(Arc::new(engine), Arc::new(enrichment), Arc::new(loader))
    }

    pub fn engine(&self) -> &Arc<RuleEngine> {
        self.runner.engine()
    }

    pub fn enrichment(&self) -> &Arc<EnrichmentProcessor> {
        self.runner.enrichment()
    }

    pub fn loader(&self) -> &Arc<DocumentLoader> {
        &self.loader
    }

    /// Load a registry document, replacing the current index. Returns the scenario count.
    pub fn load_registry(&self, path: &Path) -> Result<usize> {
        let registry = ScenarioRegistry::load(path, &self.loader)?;
        let count = registry.len();
        *self.registry.write().expect("scenario registry lock poisoned") = Arc::new(registry);
        *self.registry_path.write().expect("registry path lock poisoned") = Some(path.to_path_buf());
        Ok(count)
    }

    /// Drop cached documents and reload the last registry loaded.
    ///
    /// On failure the previous index stays in place.
    pub fn reload(&self) -> Result<usize> {
        let path = self
            .registry_path
            .read()
            .expect("registry path lock poisoned")
            .clone()
            .ok_or_else(|| ScenarioError::Routing("no registry has been loaded".into()))?;
        self.loader.clear();
        let count = self.load_registry(&path)?;
        info!(path = %path.display(), scenarios = count, "scenario registry reloaded");
        Ok(count)
    }

    /// Register one scenario alongside the loaded ones.
    pub fn register(&self, scenario: ScenarioConfiguration) -> Result<()> {
        let mut guard = self.registry.write().expect("scenario registry lock poisoned");
        let mut next = ScenarioRegistry::clone(&guard);
        next.register(scenario)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Replace the index with a registry built in code.
    pub fn set_registry(&self, registry: ScenarioRegistry) {
        *self.registry.write().expect("scenario registry lock poisoned") = Arc::new(registry);
    }

    pub fn registry(&self) -> Arc<ScenarioRegistry> {
        Arc::clone(&*self.registry.read().expect("scenario registry lock poisoned"))
    }

    /// Pick the scenario for `record`.
    ///
    /// Order: direct data-type mapping, registry routing rules, scenario
    /// classification rules, then the default scenario. Conditions see the
    /// record as `data` and the data type as `dataType`; a condition that
    /// fails to evaluate is logged and treated as false.
    pub fn route(&self, record: &dyn FieldAccessor, data_type: Option<&str>) -> Result<Arc<ScenarioConfiguration>> {
        let registry = self.registry();
        let data_type = data_type.map(str::to_string).unwrap_or_else(|| record.type_name());

        if let Some(scenario) = registry.by_data_type(&data_type) {
            debug!(data_type = %data_type, scenario_id = %scenario.scenario_id, "routed by data type");
            return Ok(scenario);
        }

        let mut bindings = Bindings::new();
        bindings.insert("data".into(), record.to_value());
        bindings.insert("dataType".into(), Value::String(data_type.clone()));

        for rule in &registry.routing().rules {
            if !self.condition_holds(&rule.condition, &bindings) {
                continue;
            }
            match registry.get(&rule.target_scenario) {
                Some(scenario) => {
                    debug!(condition = %rule.condition, scenario_id = %scenario.scenario_id, "routed by routing rule");
                    return Ok(scenario);
                }
                None => warn!(target = %rule.target_scenario, "routing rule targets an unknown scenario"),
            }
        }

        for scenario in registry.scenarios() {
            let Some(rule) = &scenario.classification_rule else {
                continue;
            };
            if self.condition_holds(&rule.condition, &bindings) {
                debug!(scenario_id = %scenario.scenario_id, "routed by classification rule");
                return Ok(Arc::clone(scenario));
            }
        }

        if let Some(scenario) = registry.default_scenario() {
            debug!(data_type = %data_type, scenario_id = %scenario.scenario_id, "routed to default scenario");
            return Ok(scenario);
        }
        Err(ScenarioError::Routing(format!("no scenario found for data type '{data_type}'")))
    }

    /// Route on data type alone.
    pub fn route_data_type(&self, data_type: &str) -> Result<Arc<ScenarioConfiguration>> {
        self.route(&MapRecord::typed(data_type), Some(data_type))
    }

    /// Route `record`, then run the chosen scenario over it.
    pub fn process(&self, record: &mut dyn FieldAccessor, data_type: Option<&str>) -> Result<ScenarioExecutionResult> {
        let data_type = data_type.map(str::to_string).unwrap_or_else(|| record.type_name());
        let scenario = self.route(record, Some(&data_type))?;
        let mut result = self.runner.execute(&scenario, record);
        result.data_type = Some(data_type);
        Ok(result)
    }

    /// Run a scenario by id, bypassing routing.
    pub fn process_with_scenario(&self, scenario_id: &str, record: &mut dyn FieldAccessor) -> Result<ScenarioExecutionResult> {
        let scenario = self
            .registry()
            .get(scenario_id)
            .ok_or_else(|| ScenarioError::Routing(format!("unknown scenario '{scenario_id}'")))?;
        let mut result = self.runner.execute(&scenario, record);
        result.data_type = Some(record.type_name());
        Ok(result)
    }

    fn condition_holds(&self, condition: &str, bindings: &Bindings) -> bool {
        match self.engine().evaluate_condition(condition, bindings) {
            Ok(holds) => holds,
            Err(e) => {
                warn!(condition, error = %e, "routing condition failed to evaluate");
                false
            }
        }
    }
}
