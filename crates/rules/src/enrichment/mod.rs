//! Record enrichment from lookups, calculations and field copies.
//!
//! Enrichments are declared in rule-config documents and applied by the
//! [`EnrichmentProcessor`] in priority order before a stage's rules run.
//! Lookup sources are either services registered by the host
//! ([`LookupService`]) or datasets declared inline, in YAML/JSON/CSV files, or
//! behind a [`QueryConnection`]. Lookup results are cached per source and key
//! with a TTL.

mod cache;
mod dataset;
mod error;
mod mapping;
mod processor;
mod types;

pub use cache::LookupCache;
pub use dataset::{DatasetFactory, FileDataset, InlineDataset, LookupService, QueryConnection, QueryDataset};
pub use error::EnrichmentError;
pub use mapping::apply_mappings;
pub use processor::{EnrichmentCacheStats, EnrichmentProcessor};
pub use types::*;

pub(crate) use mapping::record_bindings;
