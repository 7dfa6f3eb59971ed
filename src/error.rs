//! Schema-authoring errors.
//!
//! These signal a bug in the code that declares types, never a problem with
//! the data being validated. Data mismatches are reported as
//! [`ValidationError`](crate::validate::ValidationError) records instead.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A builder or registration call was handed a malformed argument.
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("unknown base type `{base}` for subtype `{name}`")]
    UnknownBaseType { base: String, name: String },

    #[error("type `{0}` is already registered")]
    DuplicateType(String),

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl SchemaError {
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        SchemaError::Argument(message.into())
    }
}
