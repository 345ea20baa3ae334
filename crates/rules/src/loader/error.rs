//! Error types and load result structures for the document loader.

use std::path::PathBuf;

use crate::schema::DocumentType;

/// Errors that can occur during document loading and management.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Document validation error (e.g. missing id, duplicate rule ids).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A document of one type was found where another was required.
    #[error("{path}: expected a {expected} document, found '{found}'")]
    UnexpectedType {
        path: PathBuf,
        expected: DocumentType,
        found: String,
    },

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single document file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Document was successfully loaded.
    Loaded { id: String, doc_type: DocumentType },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
