//! Error types for relstore
//!
//! Every fallible core call reports one of these kinds, so callers never have
//! to tell "no result" apart from "record not found" by inspecting a value.

use crate::schema::SchemaError;
use thiserror::Error;

/// The main error type for relstore operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Schema Errors
    // ==========================================================================
    #[error(transparent)]
    Schema(#[from] SchemaError),

    // ==========================================================================
    // Record Errors
    // ==========================================================================
    #[error("Record '{id}' of type '{model}' not found")]
    RecordNotFound { model: String, id: String },

    // ==========================================================================
    // Transform Errors
    // ==========================================================================
    #[error("Transform '{id}' not found in the transform log")]
    TransformNotFound { id: String },

    #[error("Transform '{id}' has already been applied")]
    DuplicateTransform { id: String },

    // ==========================================================================
    // Query Errors
    // ==========================================================================
    #[error("Query expression error: {message}")]
    QueryExpressionParse { message: String },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },
}

/// Result type alias for relstore operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

impl From<relql::ParseError> for Error {
    fn from(err: relql::ParseError) -> Self {
        Error::QueryExpressionParse {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    pub(crate) fn record_not_found(identity: &crate::RecordIdentity) -> Self {
        Error::RecordNotFound {
            model: identity.model.clone(),
            id: identity.id.clone(),
        }
    }

    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Schema(SchemaError::UnknownModel { .. }) => {
                Some("Declare the model in the schema before storing records of that type")
            }
            Error::Schema(SchemaError::UnknownRelationship { .. }) => {
                Some("Declare the relationship on the model, with its inverse if it has one")
            }
            Error::RecordNotFound { .. } => {
                Some("Add the record first, or check the type and id")
            }
            Error::DuplicateTransform { .. } => {
                Some("Transforms are applied once; create a new transform for further edits")
            }
            Error::QueryExpressionParse { .. } => {
                Some("Pagination must wrap a sort, e.g. page(sort(records('planet'), attribute('name')), limit = 10)")
            }
            _ => None,
        }
    }

    /// Returns true if the caller can correct the input and retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound { .. }
                | Error::TransformNotFound { .. }
                | Error::QueryExpressionParse { .. }
        )
    }
}
