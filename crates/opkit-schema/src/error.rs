use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal, construction-time failures. These abort startup; none of them
/// can occur once an operation has been accepted into the registry.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("required property \"{field}\" is not declared on this schema")]
    UnknownRequiredField { field: String },

    #[error("dependentRequired references undeclared property \"{field}\"")]
    UnknownDependentField { field: String },

    #[error("invalid pattern \"{pattern}\": {detail}")]
    InvalidPattern { pattern: String, detail: String },

    #[error("invalid bounds: {detail}")]
    InvalidBounds { detail: String },

    #[error("field \"{field}\": {detail}")]
    InvalidFieldMetadata { field: String, detail: String },

    #[error("type \"{type_name}\" cannot be used as a nullable object reference: {detail}")]
    UnsupportedNullableReference { type_name: String, detail: String },

    #[error("duplicate schema name \"{name}\" refers to two distinct types")]
    NameCollision { name: String },
}

/// A single validation failure, with a precomputed message wherever
/// possible. `location` is a JSON Pointer; `value` is the offending
/// value for the client's use in pinpointing the mistake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<serde_json::Value>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: location.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}
