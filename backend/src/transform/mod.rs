//! Transformation module.
//!
//! This module turns schema-typed input into experiment records:
//! - Decoder: CSV matrix to scene records
//! - Trials: Scenes to a numbered, optionally shuffled trial file
//! - Form: Submitted form values to config and scene records
//! - Pipeline: Tokenize, decode and assemble with progress logging

pub mod decoder;
pub mod form;
pub mod pipeline;
pub mod trials;

pub use decoder::{decode, DecodeError, DecodeOptions, DecodeOutcome};
pub use form::{apply_form, build_config, build_scene, default_values, FieldError, FormOutcome};
pub use pipeline::*;
pub use trials::{assemble, assemble_with_rng, TrialOptions};
