//! Filesystem document loader with hot-reload via `notify` watcher.
//!
//! Loads configuration documents through two-pass deserialization
//! (`DocumentEnvelope` -> `ConfigDocument`) into an in-memory store keyed by
//! canonical path. The optional watcher re-parses changed YAML files and
//! keeps the previous version when a change fails to parse.

mod core;
mod error;
mod watcher;


pub use self::core::DocumentLoader;
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
