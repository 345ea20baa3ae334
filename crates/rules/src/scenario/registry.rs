//! Scenario index built from a scenario-registry document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::error::{Result, ScenarioError};
use super::model::{resolve_relative, RoutingConfig, ScenarioConfiguration};
use crate::loader::{DocumentLoader, RuleError};
use crate::schema::DocumentType;

/// Scenarios by id, the data-type index and the routing block.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    registry_id: String,
    source: Option<PathBuf>,
    scenarios: IndexMap<String, Arc<ScenarioConfiguration>>,
    data_types: HashMap<String, String>,
    routing: RoutingConfig,
}

fn load_error(path: &Path) -> impl FnOnce(RuleError) -> ScenarioError {
    let path = path.to_path_buf();
    move |source| ScenarioError::Load { path, source }
}

impl ScenarioRegistry {
    pub fn new(registry_id: impl Into<String>) -> Self {
        Self {
            registry_id: registry_id.into(),
            ..Default::default()
        }
    }

    /// Load a registry document and every scenario document it lists.
    ///
    /// Scenario `config-file`s resolve against the registry's directory; each
    /// scenario's own stage files resolve against the scenario's directory.
    /// A scenario that fails to load or register is logged and left out; only
    /// a failure to load the registry document itself is an error.
    pub fn load(path: &Path, loader: &DocumentLoader) -> Result<Self> {
        let document = loader
            .load_typed(path, DocumentType::ScenarioRegistry)
            .map_err(load_error(path))?;
        let body = document.as_registry().cloned().unwrap_or_default();
        let base_dir = path.parent();

        let mut registry = Self::new(document.id());
        registry.source = Some(path.to_path_buf());
        registry.routing = body.routing.unwrap_or_default();

        for entry in &body.scenarios {
            let scenario_path = resolve_relative(base_dir, &entry.config_file);
            let scenario_doc = match loader.load_typed(&scenario_path, DocumentType::Scenario) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(
                        scenario_id = %entry.scenario_id,
                        path = %scenario_path.display(),
                        error = %e,
                        "scenario failed to load, skipping"
                    );
                    continue;
                }
            };
            let Some(scenario) = scenario_doc.as_scenario() else {
                continue;
            };
            let mut scenario = scenario.clone();
            if let Some(dir) = scenario_path.parent() {
                scenario.base_dir = Some(dir.to_path_buf());
            }
            if !entry.scenario_id.is_empty() && entry.scenario_id != scenario.scenario_id {
                warn!(
                    registry_id = %entry.scenario_id,
                    document_id = %scenario.scenario_id,
                    path = %scenario_path.display(),
                    "registry scenario id differs from the scenario document"
                );
            }
            for data_type in &entry.data_types {
                if !scenario.data_types.contains(data_type) {
                    scenario.data_types.push(data_type.clone());
                }
            }
            if let Err(e) = registry.register(scenario) {
                warn!(path = %scenario_path.display(), error = %e, "scenario not registered, skipping");
            }
        }

        info!(
            registry_id = %registry.registry_id,
            scenarios = registry.len(),
            data_types = registry.data_types.len(),
            "scenario registry loaded"
        );
        Ok(registry)
    }

    /// Add a scenario and index its data types. Ids must be unique.
    ///
    /// A data type claimed by two scenarios stays with the first.
    pub fn register(&mut self, scenario: ScenarioConfiguration) -> Result<()> {
        let id = scenario.scenario_id.trim().to_string();
        if id.is_empty() {
            return Err(ScenarioError::Validation {
                scenario_id: String::new(),
                errors: vec!["scenario-id must not be empty".into()],
            });
        }
        if self.scenarios.contains_key(&id) {
            return Err(ScenarioError::Validation {
                scenario_id: id.clone(),
                errors: vec![format!("scenario '{id}' is already registered")],
            });
        }
        for data_type in &scenario.data_types {
            match self.data_types.get(data_type) {
                Some(owner) => warn!(data_type = %data_type, owner = %owner, scenario = %id, "data type already mapped"),
                None => {
                    self.data_types.insert(data_type.clone(), id.clone());
                }
            }
        }
        debug!(scenario_id = %id, stages = scenario.processing_stages.len(), "scenario registered");
        self.scenarios.insert(id, Arc::new(scenario));
        Ok(())
    }

    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn id(&self) -> &str {
        &self.registry_id
    }

    /// Path of the registry document this index was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, scenario_id: &str) -> Option<Arc<ScenarioConfiguration>> {
        self.scenarios.get(scenario_id).cloned()
    }

    /// Scenario mapped to `data_type`: exact key first, then qualified-name matching.
    pub fn by_data_type(&self, data_type: &str) -> Option<Arc<ScenarioConfiguration>> {
        if let Some(id) = self.data_types.get(data_type) {
            return self.get(id);
        }
        self.scenarios
            .values()
            .find(|s| s.applies_to_data_type(data_type))
            .cloned()
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Arc<ScenarioConfiguration>> {
        self.scenarios.values()
    }

    pub fn scenario_ids(&self) -> Vec<&str> {
        self.scenarios.keys().map(String::as_str).collect()
    }

    /// Mapped data types, sorted.
    pub fn data_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.data_types.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    pub fn default_scenario(&self) -> Option<Arc<ScenarioConfiguration>> {
        self.routing.default_scenario.as_deref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
