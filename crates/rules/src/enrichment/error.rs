use rulekit_core::CoreError;

use crate::expression::ExpressionError;

/// Failure of a single enrichment. The processor logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("required field '{source_field}' is missing from the lookup result (target '{target_field}')")]
    MissingRequiredField {
        source_field: String,
        target_field: String,
    },

    #[error("lookup source unavailable: {0}")]
    LookupSource(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("cannot write record field: {0}")]
    Field(#[from] CoreError),

    #[error("invalid configuration for '{enrichment}': {message}")]
    Configuration { enrichment: String, message: String },
}
