//! Document envelope for lightweight first-pass deserialization.

use serde::{Deserialize, Serialize};

use super::{
    ConfigDocument, DatasetBody, DocumentBody, DocumentMetadata, DocumentType, RegistryBody,
    RuleConfigBody, ScenarioBody,
};

/// Lightweight first-pass deserializer that reads only the metadata block.
///
/// Used during two-pass loading: first extract `metadata.type` to determine
/// the body shape, then deserialize the remaining fields into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    pub metadata: DocumentMetadata,
    /// Remaining fields captured as raw YAML for second-pass deserialization.
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

impl DocumentEnvelope {
    /// Parse `metadata.type` into a typed [`DocumentType`].
    pub fn document_type(&self) -> std::result::Result<DocumentType, String> {
        self.metadata.doc_type.parse()
    }

    /// Two-pass: deserialize the body fields into the type-specific shape.
    pub fn parse_full(&self) -> std::result::Result<ConfigDocument, String> {
        let rest = serde_yaml::Value::Mapping(self.rest.clone());
        let body = match self.document_type()? {
            DocumentType::RuleConfig | DocumentType::Enrichment | DocumentType::RuleChain => {
                DocumentBody::RuleConfig(parse_body::<RuleConfigBody>(rest)?)
            }
            DocumentType::Scenario => DocumentBody::Scenario(parse_body::<ScenarioBody>(rest)?),
            DocumentType::ScenarioRegistry => DocumentBody::Registry(parse_body::<RegistryBody>(rest)?),
            DocumentType::Dataset => DocumentBody::Dataset(parse_body::<DatasetBody>(rest)?),
            DocumentType::Bootstrap | DocumentType::ExternalDataConfig | DocumentType::Pipeline => {
                DocumentBody::Other(rest)
            }
        };
        Ok(ConfigDocument {
            metadata: self.metadata.clone(),
            body,
        })
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(rest: serde_yaml::Value) -> std::result::Result<T, String> {
    serde_yaml::from_value(rest).map_err(|e| e.to_string())
}
