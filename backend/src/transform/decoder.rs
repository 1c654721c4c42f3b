//! Decode a flat CSV matrix into nested scene records.
//!
//! The spreadsheet layout is fixed by the two active schemas:
//!
//! ```text
//! | scene fields ... | object block 1 | object block 2 | object block 3 | object block 4 |
//! | Scene name | N   | Object type .. | Object type .. | Object type .. | Object type .. |
//! ```
//!
//! Every row carries all [`MAX_OBJECTS`] object blocks as columns; the scene's
//! number-of-objects field decides how many of them are read. That field is
//! consumed, not stored in the scene record.
//!
//! Cell errors are collected and decoding continues, so the user sees every
//! problem at once. Structural problems (too few rows, wrong column count,
//! wrong header label) and an out-of-range object count stop decoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{FormSchema, ObjectRecord, SceneRecord, MAX_OBJECTS};
use crate::registry::coerce_cell;

/// One decoding problem. Rows and columns are 1-based, the header being row 1.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecodeError {
    #[error("CSV file row count < 2. Please make sure that the entry labels are in the first row, and that there is at least one scene.")]
    TooFewRows,

    #[error(
        "There should be {expected} columns but you have {found}. They are:\n\n{};\n\nThen followed by {repeats} repeats of:\n\n{}.",
        .scene_labels.join(", "),
        .object_labels.join(", ")
    )]
    ColumnCount {
        expected: usize,
        found: usize,
        repeats: usize,
        #[serde(rename = "sceneLabels")]
        scene_labels: Vec<String>,
        #[serde(rename = "objectLabels")]
        object_labels: Vec<String>,
    },

    #[error("Row 1, Col {col}: column name should contain {label}")]
    HeaderMismatch { col: usize, label: String },

    #[error("Row {row}, Col {col}: {message}")]
    Cell { row: usize, col: usize, message: String },

    #[error("Row {row}: You can only have 1 - {max} objects, but you want {value}.")]
    ObjectCount { row: usize, max: usize, value: String },
}

impl DecodeError {
    /// Structural errors reject the whole file before any row is decoded.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DecodeError::TooFewRows
                | DecodeError::ColumnCount { .. }
                | DecodeError::HeaderMismatch { .. }
        )
    }
}

/// Options for [`decode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeOptions {
    /// Scene field holding the number of objects; removed from the output.
    pub num_objects_key: String,
    /// Object blocks present per row.
    pub max_objects: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            num_objects_key: "numObjects".to_string(),
            max_objects: MAX_OBJECTS,
        }
    }
}

/// Scenes decoded so far plus every error met on the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecodeOutcome {
    pub scenes: Vec<SceneRecord>,
    pub errors: Vec<DecodeError>,
}

impl DecodeOutcome {
    /// True when the CSV decoded without any error.
    ///
    /// Scenes from an outcome that is not ok must not be turned into trials.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Decoded: {} scenes, {} errors",
            self.scenes.len(),
            self.errors.len()
        )
    }

    fn fail(error: DecodeError) -> Self {
        Self { scenes: Vec::new(), errors: vec![error] }
    }
}

/// Expected number of columns for a scene/object schema pair.
pub fn expected_columns(scene: &FormSchema, object: &FormSchema, max_objects: usize) -> usize {
    scene.len() + max_objects * object.len()
}

/// Expected header labels, column by column.
pub fn expected_labels<'a>(
    scene: &'a FormSchema,
    object: &'a FormSchema,
    max_objects: usize,
) -> Vec<&'a str> {
    let mut labels = scene.labels();
    for _ in 0..max_objects {
        labels.extend(object.labels());
    }
    labels
}

/// Decode a CSV matrix (`rows[0]` is the header) into scene records.
///
/// # Arguments
/// * `scene` - Schema of the scene columns, in column order
/// * `object` - Schema of one object block, repeated `max_objects` times
/// * `rows` - Trimmed cells, blank lines already removed
/// * `options` - Number-of-objects key and block count
pub fn decode(
    scene: &FormSchema,
    object: &FormSchema,
    rows: &[Vec<String>],
    options: &DecodeOptions,
) -> DecodeOutcome {
    if rows.len() < 2 {
        return DecodeOutcome::fail(DecodeError::TooFewRows);
    }

    let header = &rows[0];
    let expected = expected_columns(scene, object, options.max_objects);
    if header.len() != expected {
        return DecodeOutcome::fail(DecodeError::ColumnCount {
            expected,
            found: header.len(),
            repeats: options.max_objects,
            scene_labels: scene.labels().into_iter().map(String::from).collect(),
            object_labels: object.labels().into_iter().map(String::from).collect(),
        });
    }

    let header_errors: Vec<DecodeError> = expected_labels(scene, object, options.max_objects)
        .into_iter()
        .zip(header)
        .enumerate()
        .filter(|(_, (label, cell))| !cell.contains(*label))
        .map(|(col, (label, _))| DecodeError::HeaderMismatch {
            col: col + 1,
            label: label.to_string(),
        })
        .collect();
    if !header_errors.is_empty() {
        return DecodeOutcome { scenes: Vec::new(), errors: header_errors };
    }

    let mut outcome = DecodeOutcome::default();

    for (row_idx, row) in rows.iter().enumerate().skip(1) {
        // An empty first cell marks the end of the data.
        if row.first().is_some_and(|cell| cell.is_empty()) {
            break;
        }
        let row_num = row_idx + 1;

        let mut fields = decode_block(scene, row, row_num, 0, &mut outcome.errors);
        let num_objects = fields.shift_remove(&options.num_objects_key);

        let count = match object_count(num_objects.as_ref(), options.max_objects) {
            Some(count) => count,
            None => {
                outcome.errors.push(DecodeError::ObjectCount {
                    row: row_num,
                    max: options.max_objects,
                    value: describe(num_objects.as_ref()),
                });
                break;
            }
        };

        let objects = (0..count)
            .map(|obj_idx| {
                let col_start = scene.len() + obj_idx * object.len();
                ObjectRecord {
                    obj_num: obj_idx + 1,
                    fields: decode_block(object, row, row_num, col_start, &mut outcome.errors),
                }
            })
            .collect();

        outcome.scenes.push(SceneRecord { fields, objects });
    }

    outcome
}

/// Decode the columns `col_start..col_start + schema.len()` of one row.
fn decode_block(
    schema: &FormSchema,
    row: &[String],
    row_num: usize,
    col_start: usize,
    errors: &mut Vec<DecodeError>,
) -> Map<String, Value> {
    let mut fields = Map::new();

    for (offset, fed) in schema.iter().enumerate() {
        let col = col_start + offset;
        let coerced = coerce_cell(fed, row.get(col).map(String::as_str));

        errors.extend(coerced.errors.into_iter().map(|message| DecodeError::Cell {
            row: row_num,
            col: col + 1,
            message,
        }));

        if let Some(value) = coerced.value {
            fields.insert(fed.key.clone(), value);
        }
    }

    fields
}

fn object_count(value: Option<&Value>, max_objects: usize) -> Option<usize> {
    let n = value?.as_f64()?;
    if n.fract() == 0.0 && n >= 1.0 && n <= max_objects as f64 {
        Some(n as usize)
    } else {
        None
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "no valid number".to_string(),
    }
}
