//! HTTP Server for the trialforge API.
//!
//! Provides REST endpoints for schema management, CSV conversion and
//! record building. Schemas and saved scenes come from the document store.
//!
//! # API Endpoints
//!
//! | Method | Path                     | Description                          |
//! |--------|--------------------------|--------------------------------------|
//! | GET    | `/health`                | Health check                         |
//! | POST   | `/api/schemas/validate`  | Validate a schema document           |
//! | GET    | `/api/schemas/{kind}`    | Active schema for scene/object/config|
//! | PUT    | `/api/schemas/{kind}`    | Replace a schema (validated first)   |
//! | POST   | `/api/csv`               | Upload CSV, get scenes + trial file  |
//! | POST   | `/api/trials`            | Assemble a trial file from scenes    |
//! | POST   | `/api/config`            | Build a configuration file           |
//! | GET    | `/api/scenes`            | List saved scenes                    |
//! | POST   | `/api/scenes`            | Build a scene from form values       |
//! | DELETE | `/api/scenes/{id}`       | Delete a saved scene                 |
//! | GET    | `/api/logs`              | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method},
    response::{sse::Event, Json, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Map, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{
    bad_request, reject, reject_store, ApiRejection, ConvertResponse, SceneRequest,
    SceneResponse, SchemaValidationResponse, TrialRequest,
};
use crate::error::{PipelineError, SchemaError, ServerResult};
use crate::models::TrialFile;
use crate::store::{DocumentStore, FormKind, SavedScene, StoredForm};
use crate::transform::form::build_scene;
use crate::transform::pipeline::{
    assemble_trials, build_config_record, convert_bytes, ConvertOptions,
};
use crate::validation::validate;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: DocumentStore,
}

/// Build the router (without binding a socket)
pub fn router(store: DocumentStore) -> Router {
    // Permissive CORS for the local frontend
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/schemas/validate", post(validate_schema))
        .route("/api/schemas/{kind}", get(get_schema).put(put_schema))
        .route("/api/csv", post(upload_csv))
        .route("/api/trials", post(build_trials))
        .route("/api/config", post(build_config))
        .route("/api/scenes", get(list_scenes).post(create_scene))
        .route("/api/scenes/{id}", delete(delete_scene))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(AppState { store })
}

/// Start the HTTP server
pub async fn start_server(port: u16, store: DocumentStore) -> ServerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Trialforge server running on http://localhost:{}", port);
    println!("   Store: {}", store.root().display());
    println!("   POST /api/csv     - Upload CSV file");
    println!("   POST /api/trials  - Assemble trials");
    println!("   POST /api/config  - Build config file");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();

    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "trialforge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "csv": "POST /api/csv",
            "trials": "POST /api/trials",
            "config": "POST /api/config",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // Lagged receivers skip missed entries
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Schemas
// =============================================================================

async fn validate_schema(Json(doc): Json<Value>) -> Json<SchemaValidationResponse> {
    let response = match doc.as_array() {
        Some(entries) => {
            let diagnostics = validate(entries);
            SchemaValidationResponse {
                valid: diagnostics.is_empty(),
                error: None,
                diagnostics,
            }
        }
        None => SchemaValidationResponse {
            valid: false,
            error: Some(SchemaError::NotAList.to_string()),
            diagnostics: Vec::new(),
        },
    };
    Json(response)
}

async fn get_schema(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<StoredForm>, ApiRejection> {
    let kind: FormKind = kind.parse().map_err(reject_store)?;
    state.store.load_form(kind).map(Json).map_err(reject_store)
}

async fn put_schema(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(doc): Json<Value>,
) -> Result<Json<StoredForm>, ApiRejection> {
    let kind: FormKind = kind.parse().map_err(reject_store)?;
    state.store.store_schema(kind, &doc).map_err(reject_store)?;
    state.store.load_form(kind).map(Json).map_err(reject_store)
}

// =============================================================================
// Conversion
// =============================================================================

/// Upload CSV endpoint
///
/// Multipart fields: `file` (required), `repeatCount`, `shuffle`, `save`.
async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, ApiRejection> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut options = ConvertOptions::default();
    let mut save = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?
                    .to_vec(),
            );
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| bad_request(format!("Read error: {}", e)))?;
        match name.as_str() {
            "repeatCount" => {
                options.trial.repeat_count = text
                    .trim()
                    .parse()
                    .map_err(|_| bad_request(format!("repeatCount must be a positive integer, got {:?}", text)))?;
            }
            "shuffle" => options.trial.shuffle = is_truthy(&text),
            "save" => save = is_truthy(&text),
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;

    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let scene = state.store.load_schema(FormKind::Scene).map_err(reject_store)?;
    let object = state.store.load_schema(FormKind::Object).map_err(reject_store)?;

    let result = convert_bytes(&bytes, &scene, &object, &options).map_err(|e| reject(&e))?;

    let saved_ids = if save {
        state
            .store
            .add_scenes(result.scenes.clone())
            .map_err(reject_store)?
            .into_iter()
            .map(|s| s.id)
            .collect()
    } else {
        Vec::new()
    };

    let mut response = ConvertResponse::from(result);
    response.saved_ids = saved_ids;
    Ok(Json(response))
}

async fn build_trials(
    State(state): State<AppState>,
    Json(request): Json<TrialRequest>,
) -> Result<Json<TrialFile>, ApiRejection> {
    let mut scenes = state.store.get_scenes(&request.scene_ids).map_err(reject_store)?;
    scenes.extend(request.scenes);

    assemble_trials(&scenes, &request.options)
        .map(Json)
        .map_err(|e| reject(&e))
}

async fn build_config(
    State(state): State<AppState>,
    Json(values): Json<Map<String, Value>>,
) -> Result<Json<Map<String, Value>>, ApiRejection> {
    let schema = state.store.load_schema(FormKind::Config).map_err(reject_store)?;
    build_config_record(&schema, &values)
        .map(Json)
        .map_err(|e| reject(&e))
}

// =============================================================================
// Scenes
// =============================================================================

async fn list_scenes(State(state): State<AppState>) -> Result<Json<Vec<SavedScene>>, ApiRejection> {
    state.store.list_scenes().map(Json).map_err(reject_store)
}

async fn create_scene(
    State(state): State<AppState>,
    Json(request): Json<SceneRequest>,
) -> Result<Json<SceneResponse>, ApiRejection> {
    let scene_schema = state.store.load_schema(FormKind::Scene).map_err(reject_store)?;
    let object_schema = state.store.load_schema(FormKind::Object).map_err(reject_store)?;

    let scene = build_scene(
        &scene_schema,
        &object_schema,
        &request.scene,
        &request.objects,
        &ConvertOptions::default().decode,
    )
    .map_err(|errors| reject(&PipelineError::Form(errors)))?;

    if request.save {
        let saved = state.store.add_scene(scene).map_err(reject_store)?;
        return Ok(Json(SceneResponse {
            id: Some(saved.id),
            scene: saved.scene,
        }));
    }

    Ok(Json(SceneResponse { id: None, scene }))
}

async fn delete_scene(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedScene>, ApiRejection> {
    state.store.delete_scene(&id).map(Json).map_err(reject_store)
}

fn is_truthy(text: &str) -> bool {
    matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_form_values() {
        assert!(is_truthy("true"));
        assert!(is_truthy(" On "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[tokio::test]
    async fn test_validate_schema_reports_not_a_list() {
        let Json(response) = validate_schema(Json(json!({ "key": "x" }))).await;

        assert!(!response.valid);
        assert!(response.error.unwrap().contains("list"));
    }

    #[tokio::test]
    async fn test_build_trials_from_inline_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState { store: DocumentStore::with_dir(dir.path()) };
        let request: TrialRequest = serde_json::from_value(json!({
            "scenes": [{ "sceneName": "a", "objects": [] }, { "objects": [] }],
            "repeatCount": 2
        }))
        .unwrap();

        let Json(file) = build_trials(State(state), Json(request)).await.unwrap();

        assert_eq!(file.trials.len(), 4);
        assert_eq!(file.trials[1].trial_name, "Scene 2");
    }

    #[tokio::test]
    async fn test_build_trials_without_scenes_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState { store: DocumentStore::with_dir(dir.path()) };

        let (status, _) = build_trials(State(state), Json(TrialRequest::default()))
            .await
            .unwrap_err();

        assert_eq!(status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_build_config_uses_stored_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());
        store
            .store_schema(
                FormKind::Config,
                &json!([{ "key": "trialFile", "label": "Trial file", "type": "text", "addonAfter": ".json" }]),
            )
            .unwrap();
        let state = AppState { store };

        let mut values = Map::new();
        values.insert("trialFile".into(), json!("block1"));
        let Json(config) = build_config(State(state), Json(values)).await.unwrap();

        assert_eq!(config["trialFile"], "block1.json");
    }
}
