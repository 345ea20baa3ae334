//! YAML-configured business rule engine.
//!
//! This crate provides:
//! - A typed document model for rule configs, scenarios, registries and datasets
//! - A caching document loader with optional hot-reload via `notify`
//! - Jinja-style expression evaluation behind [`expression::ExpressionEvaluator`]
//! - Rule sets, rule groups and error recovery ([`engine`])
//! - Six rule-chain patterns ([`chain`])
//! - Field enrichment from datasets and calculations with TTL caches ([`enrichment`])
//! - Scenario routing and dependency-ordered stage execution ([`scenario`])
//! - Document validation with suggestions ([`validation`])
//! - Cross-document dependency analysis ([`dependency`])

pub mod chain;
pub mod dependency;
pub mod engine;
pub mod enrichment;
pub mod expression;
pub mod loader;
pub mod scenario;
pub mod schema;
pub mod validation;

pub(crate) mod dag;
