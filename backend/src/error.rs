//! Error types for trialforge.
//!
//! This module defines one error type per layer:
//!
//! - [`ParseError`] - CSV tokenizing errors (file, encoding, malformed CSV)
//! - [`SchemaError`] - Schema import errors (not a list, invalid entries)
//! - [`StoreError`] - Document store errors
//! - [`PipelineError`] - CSV-to-trial-file orchestration errors
//! - [`ServerError`] - HTTP server errors
//!
//! Malformed *data* inside a well-formed file (a bad cell, a bad schema entry)
//! is not an error of this module: it is reported as diagnostics returned
//! alongside results. Conversions are automatic via `From`, so `?` works
//! across layers.

use thiserror::Error;

use crate::transform::decoder::DecodeError;
use crate::transform::form::FieldError;
use crate::validation::EntryDiagnostic;

// =============================================================================
// CSV Tokenizing Errors
// =============================================================================

/// Errors while turning CSV bytes into a string matrix.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes could not be decoded with the detected encoding.
    #[error("Failed to decode content as {0}")]
    Encoding(String),

    /// Malformed CSV.
    #[error("Invalid CSV format: {0}")]
    Csv(#[from] csv::Error),

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while importing a form schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document is not a list at all.
    #[error("schema must be a list of Form Entry Definitions")]
    NotAList,

    /// One or more entries are structurally invalid.
    #[error("{} schema entries are invalid", .0.len())]
    InvalidEntries(Vec<EntryDiagnostic>),

    /// The text is not JSON, or does not fit the typed model.
    #[error("Schema JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Flatten into printable lines, one per message.
    pub fn messages(&self) -> Vec<String> {
        match self {
            SchemaError::InvalidEntries(diagnostics) => diagnostics
                .iter()
                .flat_map(|d| {
                    d.messages
                        .iter()
                        .map(move |m| format!("Entry {}: {}", d.index + 1, m))
                })
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown form kind.
    #[error("Unknown form kind: {0} (expected scene, object or config)")]
    UnknownKind(String),

    /// Saved scene not found.
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    /// Rejected schema.
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// CSV-to-trial-file orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV tokenizing error.
    #[error("CSV error: {0}")]
    Parse(#[from] ParseError),

    /// Schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The CSV decoded with errors; nothing is assembled from partial data.
    #[error("CSV has {} error(s)", .0.len())]
    Decode(Vec<DecodeError>),

    /// A submitted form did not pass its schema.
    #[error("Form has {} error(s)", .0.len())]
    Form(Vec<FieldError>),

    /// No scenes to put in a trial file.
    #[error("Please select at least one scene")]
    NoScenes,

    /// Trials need at least one pass over the scenes.
    #[error("Repeat count must be at least 1")]
    InvalidRepeatCount,

    /// The CSV delimiter must be a single ASCII character.
    #[error("Invalid delimiter: {0:?}")]
    InvalidDelimiter(char),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Every user-facing message carried by this error.
    pub fn messages(&self) -> Vec<String> {
        match self {
            PipelineError::Decode(errors) => errors.iter().map(|e| e.to_string()).collect(),
            PipelineError::Form(errors) => errors.iter().map(|e| e.to_string()).collect(),
            PipelineError::Schema(e) => e.messages(),
            other => vec![other.to_string()],
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV tokenizing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ParseError -> PipelineError
        let pipeline_err: PipelineError = ParseError::EmptyFile.into();
        assert!(pipeline_err.to_string().contains("empty"));

        // SchemaError -> StoreError -> PipelineError
        let store_err: StoreError = SchemaError::NotAList.into();
        let pipeline_err: PipelineError = store_err.into();
        assert!(pipeline_err.to_string().contains("list of Form Entry Definitions"));
    }

    #[test]
    fn test_schema_error_messages() {
        let err = SchemaError::InvalidEntries(vec![EntryDiagnostic {
            index: 2,
            messages: vec!["`x` is a duplicate key".into()],
        }]);
        assert_eq!(err.messages(), vec!["Entry 3: `x` is a duplicate key".to_string()]);
        assert!(err.to_string().contains("1 schema entries"));
    }

    #[test]
    fn test_decode_errors_listed() {
        let err = PipelineError::Decode(vec![DecodeError::TooFewRows]);
        assert_eq!(err.messages().len(), 1);
        assert!(err.to_string().contains("1 error"));
    }
}
