//! # Trialforge - Schema-driven trial files for VR experiments
//!
//! Trialforge turns experimenter-authored form schemas and spreadsheets into
//! the JSON files a VR experiment runtime reads: one trial file per block of
//! scenes, one configuration file per subject.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│   Decoder   │────▶│   Trials    │
//! │  (ISO/UTF8) │     │  (matrix)   │     │  (schemas)  │     │  (shuffle)  │
//! └─────────────┘     └─────────────┘     └──────▲──────┘     └─────────────┘
//!                                                │
//!                     ┌─────────────┐     ┌──────┴──────┐
//!                     │ Form values │────▶│ Form schema │  (validated, stored)
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trialforge::{convert_csv, ConvertOptions, DocumentStore, FormKind};
//!
//! let store = DocumentStore::new();
//! let scene = store.load_schema(FormKind::Scene)?;
//! let object = store.load_schema(FormKind::Object)?;
//!
//! let result = convert_csv("scenes.csv".as_ref(), &scene, &object, &ConvertOptions::default())?;
//! println!("Generated {} trials", result.trial_file.trials.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Form entry definitions, schemas, scene and trial records
//! - [`registry`] - Per-field-type shape checks and value coercion
//! - [`validation`] - Schema validation
//! - [`parser`] - CSV tokenizing with encoding detection
//! - [`transform`] - Decoder, trial assembly, form commits and pipeline
//! - [`store`] - File-backed schemas, output paths and saved scenes
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Field types and schemas
pub mod registry;
pub mod validation;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Persistence
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{ParseError, PipelineError, SchemaError, ServerError, StoreError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Addon,
    FieldKind,
    FieldType,
    FormEntryDefinition,
    FormSchema,
    ListItemType,
    ObjectRecord,
    SceneRecord,
    SelectOptions,
    TrialEntry,
    TrialFile,
    MAX_OBJECTS,
};

// =============================================================================
// Re-exports - Field types and validation
// =============================================================================

pub use registry::{check_value, coerce_cell, validate_definition_shape, Coerced};

pub use validation::{is_valid, load_schema, parse_schema, validate, EntryDiagnostic};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_encoding,
    parse_bytes_auto,
    parse_csv_file_auto,
    parse_matrix,
    ParsedCsv,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    apply_form,
    assemble,
    assemble_with_rng,
    build_config,
    build_scene,
    decode,
    default_values,
    DecodeError,
    DecodeOptions,
    DecodeOutcome,
    FieldError,
    FormOutcome,
    TrialOptions,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    assemble_trials,
    build_config_record,
    convert_bytes,
    convert_csv,
    decode_parsed,
    ConvertOptions,
    CsvInfo,
    PipelineResult,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{DocumentStore, FormKind, SavedScene, StoredForm};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
