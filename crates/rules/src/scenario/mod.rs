//! Scenario routing and staged processing.
//!
//! A scenario is the per-data-type processing specification: either a DAG
//! of processing stages, each backed by a rule-config document, or a legacy
//! flat list of rule-config files. The [`ScenarioService`] routes a record to
//! a scenario through the [`ScenarioRegistry`], validates the stage graph and
//! runs it with the [`StageRunner`], aggregating a
//! [`ScenarioExecutionResult`].

mod error;
mod model;
mod registry;
mod result;
mod runner;
mod service;
mod validator;


pub use error::{Result, ScenarioError};
pub use model::{
    ClassificationRule, FailurePolicy, ProcessingStage, RegistryEntry, RoutingConfig, RoutingRule,
    ScenarioConfiguration,
};
pub use registry::ScenarioRegistry;
pub use result::{ScenarioExecutionResult, ScenarioStatus, StageExecutionResult, StageOutcome};
pub use runner::StageRunner;
pub use service::ScenarioService;
pub use validator::{execution_plan, validate_scenario};

pub(crate) use model::resolve_relative;
