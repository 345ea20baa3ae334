//! Configuration document schema with serde deserialization.
//!
//! Every document carries a `metadata` block whose `type` selects the body:
//! - `DocumentEnvelope`: lightweight first-pass header (metadata + raw rest)
//! - `ConfigDocument`: metadata plus a `DocumentBody` variant per type
//!
//! New document types get a `DocumentType` variant and, if they carry a
//! typed body, a `DocumentBody` variant.

mod document;
mod envelope;
mod kind;
mod metadata;

pub use document::*;
pub use envelope::*;
pub use kind::*;
pub use metadata::*;

/// Parse a YAML string into a typed document (two-pass).
pub fn parse_document(yaml: &str) -> Result<ConfigDocument, String> {
    let envelope: DocumentEnvelope = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
    envelope.parse_full()
}

#[cfg(test)]
mod tests;
