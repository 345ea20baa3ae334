use thiserror::Error;

/// Errors raised while reading or writing record fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown field '{field}' on {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Cannot assign field '{field}' on {type_name}: {reason}")]
    FieldType {
        type_name: String,
        field: String,
        reason: String,
    },
}
