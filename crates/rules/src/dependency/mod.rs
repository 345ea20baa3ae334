//! Configuration dependency analysis.
//!
//! Starting from a root document (usually the scenario registry), follows
//! `config-file`, `rule-configurations`, `data-source-refs`,
//! `lookup-dataset.file-path` and file-like `dependencies` references and
//! builds a [`DependencyGraph`]. The graph answers impact questions (what
//! breaks if this file changes), reports missing and invalid files,
//! reference cycles, and files nothing references.

mod analyzer;
mod graph;


pub use analyzer::DependencyAnalyzer;
pub use graph::{DependencyEdge, DependencyGraph, DependencySummary, DocumentNode, NodeStatus};
