//! High-level pipeline API: CSV to trial file.
//!
//! This module combines all steps: tokenizing, decoding against the
//! scene/object schemas, and trial assembly. Progress goes to the log
//! broadcaster so the CLI and SSE clients see the same lines.
//!
//! Decoding never yields partial data: any decode error aborts the
//! conversion with [`PipelineError::Decode`] carrying every error.
//!
//! # Example
//!
//! ```rust,ignore
//! use trialforge::transform::pipeline::{convert_csv, ConvertOptions};
//! use std::path::Path;
//!
//! let result = convert_csv(
//!     Path::new("scenes.csv"),
//!     &scene_schema,
//!     &object_schema,
//!     &ConvertOptions::default(),
//! )?;
//!
//! println!("Generated {} trials", result.trial_file.trials.len());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::PipelineError;
use crate::models::{FormSchema, SceneRecord, TrialFile};
use crate::parser::{
    delimiter_byte, parse_bytes_auto, parse_csv_file_auto, ParsedCsv, DEFAULT_DELIMITER,
};
use crate::transform::decoder::{decode, DecodeOptions};
use crate::transform::form::build_config;
use crate::transform::trials::{assemble, TrialOptions};

/// Errors listed individually in the log before the rest are summarized.
const LOGGED_ERRORS: usize = 10;

/// Options for the conversion pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// CSV field delimiter
    pub delimiter: char,

    /// Number-of-objects key and object block count
    pub decode: DecodeOptions,

    /// Repeat count, shuffle, scene name key
    pub trial: TrialOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER as char,
            decode: DecodeOptions::default(),
            trial: TrialOptions::default(),
        }
    }
}

/// Result of a complete conversion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Decoded scenes, in CSV order
    pub scenes: Vec<SceneRecord>,

    /// Assembled trial file
    pub trial_file: TrialFile,

    /// CSV tokenizing metadata
    pub csv_info: CsvInfo,
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub row_count: usize,
    pub column_count: usize,
}

impl From<&ParsedCsv> for CsvInfo {
    fn from(parsed: &ParsedCsv) -> Self {
        Self {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter,
            row_count: parsed.rows.len(),
            column_count: parsed.column_count(),
        }
    }
}

/// Convert a CSV file to a trial file.
///
/// # Arguments
/// * `path` - Path to the CSV file
/// * `scene` - Scene schema (columns before the object blocks)
/// * `object` - Object schema (one block)
/// * `options` - Conversion options
pub fn convert_csv(
    path: &Path,
    scene: &FormSchema,
    object: &FormSchema,
    options: &ConvertOptions,
) -> Result<PipelineResult, PipelineError> {
    log_info(format!("📖 Reading {}...", path.display()));
    let parsed = parse_csv_file_auto(path, checked_delimiter(options.delimiter)?)?;
    convert_parsed(parsed, scene, object, options)
}

/// Convert CSV bytes to a trial file.
///
/// Same as [`convert_csv`] but accepts raw bytes instead of a file path.
pub fn convert_bytes(
    bytes: &[u8],
    scene: &FormSchema,
    object: &FormSchema,
    options: &ConvertOptions,
) -> Result<PipelineResult, PipelineError> {
    log_info(format!("📖 Reading {} bytes of CSV...", bytes.len()));
    let parsed = parse_bytes_auto(bytes, checked_delimiter(options.delimiter)?)?;
    convert_parsed(parsed, scene, object, options)
}

/// Decode a tokenized CSV into scenes, failing on any decode error.
pub fn decode_parsed(
    parsed: &ParsedCsv,
    scene: &FormSchema,
    object: &FormSchema,
    options: &DecodeOptions,
) -> Result<Vec<SceneRecord>, PipelineError> {
    log_info(format!(
        "🔍 Decoding {} rows ({} scene fields, {} × {} object fields)...",
        parsed.rows.len(),
        scene.len(),
        options.max_objects,
        object.len()
    ));

    let outcome = decode(scene, object, &parsed.rows, options);
    if !outcome.is_ok() {
        log_error(outcome.summary());
        for error in outcome.errors.iter().take(LOGGED_ERRORS) {
            log_info_indent(error.to_string(), 1);
        }
        if outcome.errors.len() > LOGGED_ERRORS {
            log_info_indent(
                format!("... +{} more", outcome.errors.len() - LOGGED_ERRORS),
                1,
            );
        }
        return Err(PipelineError::Decode(outcome.errors));
    }

    log_success(outcome.summary());
    Ok(outcome.scenes)
}

/// Assemble scenes into a trial file, rejecting empty input.
pub fn assemble_trials(
    scenes: &[SceneRecord],
    options: &TrialOptions,
) -> Result<TrialFile, PipelineError> {
    if scenes.is_empty() {
        log_warning("No scenes selected");
        return Err(PipelineError::NoScenes);
    }
    if options.repeat_count == 0 {
        return Err(PipelineError::InvalidRepeatCount);
    }

    log_info(format!(
        "🎲 Assembling {} scenes × {}{}...",
        scenes.len(),
        options.repeat_count,
        if options.shuffle { " (shuffled)" } else { "" }
    ));
    let trial_file = assemble(scenes, options);
    log_success(format!("{} trials", trial_file.trials.len()));

    Ok(trial_file)
}

/// Build a configuration record, failing on any field error.
pub fn build_config_record(
    schema: &FormSchema,
    values: &Map<String, Value>,
) -> Result<Map<String, Value>, PipelineError> {
    build_config(schema, values).map_err(|errors| {
        log_error(format!("Configuration has {} error(s)", errors.len()));
        PipelineError::Form(errors)
    })
}

/// Internal: decode and assemble tokenized CSV
fn convert_parsed(
    parsed: ParsedCsv,
    scene: &FormSchema,
    object: &FormSchema,
    options: &ConvertOptions,
) -> Result<PipelineResult, PipelineError> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!(
        "Read {} rows, up to {} columns",
        parsed.rows.len(),
        parsed.column_count()
    ));

    let csv_info = CsvInfo::from(&parsed);
    let scenes = decode_parsed(&parsed, scene, object, &options.decode)?;
    let trial_file = assemble_trials(&scenes, &options.trial)?;

    Ok(PipelineResult {
        scenes,
        trial_file,
        csv_info,
    })
}

fn checked_delimiter(delimiter: char) -> Result<u8, PipelineError> {
    delimiter_byte(delimiter).ok_or(PipelineError::InvalidDelimiter(delimiter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::decoder::DecodeError;
    use serde_json::json;

    fn scene_schema() -> FormSchema {
        serde_json::from_value(json!([
            { "key": "sceneName", "label": "Scene name", "type": "text" },
            { "key": "numObjects", "label": "Number of objects", "type": "number" }
        ]))
        .unwrap()
    }

    fn object_schema() -> FormSchema {
        serde_json::from_value(json!([
            { "key": "objType", "label": "Object type", "type": "select", "options": { "car": "Car" } }
        ]))
        .unwrap()
    }

    const HEADER: &str = "Scene name,Number of objects,Object type,Object type,Object type,Object type\n";

    #[test]
    fn test_default_options() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.delimiter, ',');
        assert_eq!(opts.decode.num_objects_key, "numObjects");
        assert_eq!(opts.trial.repeat_count, 1);
        assert!(!opts.trial.shuffle);
    }

    #[test]
    fn test_convert_bytes() {
        let csv = format!("{}room1,1,car,,,\nroom2,2,car,car,,\n", HEADER);
        let options = ConvertOptions {
            trial: TrialOptions { repeat_count: 2, ..Default::default() },
            ..Default::default()
        };

        let result = convert_bytes(csv.as_bytes(), &scene_schema(), &object_schema(), &options).unwrap();

        assert_eq!(result.scenes.len(), 2);
        assert_eq!(result.trial_file.trials.len(), 4);
        assert_eq!(result.trial_file.trials[3].trial_name, "room2");
        assert_eq!(result.csv_info.row_count, 3);
        assert_eq!(result.csv_info.column_count, 6);
    }

    #[test]
    fn test_decode_errors_abort() {
        let csv = format!("{}room1,1,plane,,,\nroom2,2,car,,,\n", HEADER);

        let err = convert_bytes(csv.as_bytes(), &scene_schema(), &object_schema(), &ConvertOptions::default())
            .unwrap_err();

        match err {
            PipelineError::Decode(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], DecodeError::Cell { row: 2, col: 3, .. }));
            }
            other => panic!("expected decode errors, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_has_no_scenes() {
        let err = convert_bytes(HEADER.as_bytes(), &scene_schema(), &object_schema(), &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_sentinel_row_before_data_gives_no_scenes() {
        let csv = format!("{},,,,,\nroom1,1,car,,,\n", HEADER);
        let err = convert_bytes(csv.as_bytes(), &scene_schema(), &object_schema(), &ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoScenes));
    }

    #[test]
    fn test_assemble_rejects_bad_input() {
        assert!(matches!(
            assemble_trials(&[], &TrialOptions::default()),
            Err(PipelineError::NoScenes)
        ));

        let scene: SceneRecord = serde_json::from_value(json!({ "sceneName": "a" })).unwrap();
        let options = TrialOptions { repeat_count: 0, ..Default::default() };
        assert!(matches!(
            assemble_trials(&[scene], &options),
            Err(PipelineError::InvalidRepeatCount)
        ));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let options = ConvertOptions { delimiter: '§', ..Default::default() };
        let err = convert_bytes(b"a", &scene_schema(), &object_schema(), &options).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDelimiter('§')));
    }

    #[test]
    fn test_convert_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenes.csv");
        std::fs::write(&path, format!("{}room1,1,car,,,\n", HEADER)).unwrap();

        let result = convert_csv(&path, &scene_schema(), &object_schema(), &ConvertOptions::default()).unwrap();
        assert_eq!(result.trial_file.trials[0].trial_num, 1);
    }
}
