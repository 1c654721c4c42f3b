//! REST API types for frontend integration.
//!
//! Records are returned exactly as they are written to disk, so the frontend
//! can save a response body as the trial or configuration file.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{PipelineError, SchemaError, StoreError};
use crate::models::{SceneRecord, TrialFile};
use crate::transform::pipeline::{CsvInfo, PipelineResult};
use crate::transform::trials::TrialOptions;
use crate::validation::EntryDiagnostic;

/// Error half of every handler result
pub type ApiRejection = (StatusCode, Json<Value>);

// =============================================================================
// Responses
// =============================================================================

/// Response sent after a CSV upload was converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Always "ready"; failures use [`error_response`]
    pub status: String,

    pub trial_file: TrialFile,

    pub scenes: Vec<SceneRecord>,

    /// Ids of the scenes when they were saved to the store
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub saved_ids: Vec<String>,

    pub metadata: ResponseMetadata,
}

/// Metadata about the conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub scene_count: usize,
    pub trial_count: usize,
    pub csv_info: CsvMetadata,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub column_count: usize,
}

impl From<CsvInfo> for CsvMetadata {
    fn from(info: CsvInfo) -> Self {
        Self {
            encoding: info.encoding,
            delimiter: info.delimiter.to_string(),
            row_count: info.row_count,
            column_count: info.column_count,
        }
    }
}

impl From<PipelineResult> for ConvertResponse {
    fn from(result: PipelineResult) -> Self {
        ConvertResponse {
            job_id: Uuid::new_v4().to_string(),
            status: "ready".to_string(),
            metadata: ResponseMetadata {
                scene_count: result.scenes.len(),
                trial_count: result.trial_file.trials.len(),
                csv_info: result.csv_info.into(),
            },
            trial_file: result.trial_file,
            scenes: result.scenes,
            saved_ids: Vec::new(),
        }
    }
}

/// Result of `POST /api/schemas/validate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaValidationResponse {
    pub valid: bool,
    /// Set when the document is not a list at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub diagnostics: Vec<EntryDiagnostic>,
}

/// Result of `POST /api/scenes`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub scene: SceneRecord,
}

// =============================================================================
// Requests
// =============================================================================

/// Body of `POST /api/trials`
///
/// Stored scenes (by id) come first, followed by inline scenes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRequest {
    #[serde(default)]
    pub scene_ids: Vec<String>,
    #[serde(default)]
    pub scenes: Vec<SceneRecord>,
    #[serde(flatten)]
    pub options: TrialOptions,
}

/// Body of `POST /api/scenes`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRequest {
    /// Scene form values
    #[serde(default)]
    pub scene: Map<String, Value>,
    /// One value map per object form
    #[serde(default)]
    pub objects: Vec<Map<String, Value>>,
    /// Also keep the scene in the store
    #[serde(default)]
    pub save: bool,
}

// =============================================================================
// Errors
// =============================================================================

/// Create an error response body
pub fn error_response(error: &str, errors: &[String]) -> Value {
    json!({
        "status": "error",
        "error": error,
        "errors": errors,
    })
}

/// Map a pipeline error to a status code and body.
///
/// Data problems (decode, form, schema) are 422 with every message listed
/// and the structured diagnostics under `details`.
pub fn reject(err: &PipelineError) -> ApiRejection {
    let mut body = error_response(&err.to_string(), &err.messages());

    let details = match err {
        PipelineError::Decode(errors) => serde_json::to_value(errors).ok(),
        PipelineError::Form(errors) => serde_json::to_value(errors).ok(),
        PipelineError::Schema(SchemaError::InvalidEntries(diagnostics))
        | PipelineError::Store(StoreError::Schema(SchemaError::InvalidEntries(diagnostics))) => {
            serde_json::to_value(diagnostics).ok()
        }
        _ => None,
    };
    if let Some(details) = details {
        body["details"] = details;
    }

    (status_for(err), Json(body))
}

pub fn reject_store(err: StoreError) -> ApiRejection {
    reject(&PipelineError::from(err))
}

pub fn bad_request(message: impl Into<String>) -> ApiRejection {
    let message = message.into();
    (
        StatusCode::BAD_REQUEST,
        Json(error_response(&message, std::slice::from_ref(&message))),
    )
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Parse(_)
        | PipelineError::Schema(_)
        | PipelineError::Decode(_)
        | PipelineError::Form(_)
        | PipelineError::NoScenes
        | PipelineError::InvalidRepeatCount
        | PipelineError::InvalidDelimiter(_)
        | PipelineError::Store(StoreError::Schema(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Store(StoreError::UnknownKind(_))
        | PipelineError::Store(StoreError::SceneNotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::decoder::DecodeError;

    #[test]
    fn test_decode_errors_are_unprocessable() {
        let err = PipelineError::Decode(vec![
            DecodeError::TooFewRows,
            DecodeError::Cell { row: 2, col: 3, message: "bad".into() },
        ]);
        let (status, Json(body)) = reject(&err);

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "error");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
        assert_eq!(body["details"][1]["kind"], "cell");
    }

    #[test]
    fn test_missing_scene_is_not_found() {
        let (status, Json(body)) = reject_store(StoreError::SceneNotFound("abc".into()));

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("abc"));
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_trial_request_flattens_options() {
        let request: TrialRequest = serde_json::from_value(json!({
            "scenes": [{ "sceneName": "a", "objects": [] }],
            "repeatCount": 3,
            "shuffle": true
        }))
        .unwrap();

        assert!(request.scene_ids.is_empty());
        assert_eq!(request.scenes.len(), 1);
        assert_eq!(request.options.repeat_count, 3);
        assert!(request.options.shuffle);
        assert_eq!(request.options.scene_name_key, "sceneName");
    }
}
