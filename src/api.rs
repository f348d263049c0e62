//! HTTP API surface for the ASL translation service.
//!
//! This module owns request parsing, authentication, input validation, and
//! response formatting while delegating recognition and translation to
//! backend implementations and persistence to the upload store.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::task;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::recognition::{RecognizeRequest, Recognizer};
use crate::store::UploadStore;
use crate::translation::{Translator, SUGGESTION_COUNT};
use crate::video::{self, sample_frames};

/// Human-readable service name returned by health endpoints.
pub const APP_NAME: &str = "asl-translate-rs";
/// Service version string returned by health endpoints.
pub const APP_VERSION: &str = "0.1.0";

/// Shared state injected into all route handlers.
pub struct AppState {
    /// Runtime configuration loaded at startup.
    pub cfg: AppConfig,
    /// Upload and result persistence.
    pub store: Arc<UploadStore>,
    /// Active gesture-recognition backend.
    pub recognizer: Arc<dyn Recognizer>,
    /// Active translation backend.
    pub translator: Arc<dyn Translator>,
}

impl AppState {
    /// Constructs shared handler state.
    pub fn new(
        cfg: AppConfig,
        store: Arc<UploadStore>,
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            cfg,
            store,
            recognizer,
            translator,
        }
    }
}

/// Builds the Axum router for all public endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Leave headroom above the upload cap so the explicit size check can
    // produce a 413 instead of a generic multipart read failure.
    let body_limit = usize::try_from(state.cfg.max_upload_bytes.saturating_add(1024 * 1024))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/models/status", get(models_status))
        .route("/upload", post(upload_video))
        .route("/video/:file_id", get(get_video))
        .route("/result/:file_id", get(get_result))
        .route("/translate", post(translate_text))
        .route("/batch_translate", post(batch_translate))
        .route("/files", get(list_files))
        .route("/delete/:file_id", delete(delete_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health report (`GET /` and `GET /health`).
pub async fn health(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;
    Ok(Json(json!({
        "status": "healthy",
        "name": APP_NAME,
        "version": APP_VERSION,
        "models_loaded": {
            "asl_recognition": true,
            "t5_translation": true,
        },
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// Per-pipeline model detail (`GET /models/status`).
pub async fn models_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;
    Ok(Json(json!({
        "asl_recognition": {
            "loaded": true,
            "type": state.cfg.recognizer_kind.as_str(),
            "capabilities": ["frame_sampling", "letter_classification", "video_processing"],
        },
        "t5_translation": {
            "loaded": true,
            "type": state.cfg.translator_kind.as_str(),
            "capabilities": ["asl_to_english", "batch_translation", "translation_suggestions"],
        },
    })))
}

/// Uploads and processes one ASL video (`POST /upload`).
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;

    let (filename, bytes) = parse_video_form(&mut multipart).await?;
    let extension = video::validate_extension(&filename)?;

    let file_size = bytes.len() as u64;
    if file_size > state.cfg.max_upload_bytes {
        return Err(AppError::payload_too_large(format!(
            "file is {file_size} bytes; the limit is {} bytes",
            state.cfg.max_upload_bytes
        )));
    }

    let file_id = Uuid::new_v4();
    let store = Arc::clone(&state.store);
    let sample_rate = state.cfg.frame_sample_rate;
    let stored_extension = extension;
    let (info, frames) = task::spawn_blocking(move || {
        store.save_video(&file_id, &stored_extension, &bytes)?;
        sample_frames(&bytes, &stored_extension, sample_rate)
    })
    .await
    .map_err(|err| AppError::internal(format!("upload worker task failed: {err}")))??;

    let recognition = state
        .recognizer
        .recognize(RecognizeRequest { info, frames })
        .await?;
    if recognition.sequence.is_empty() {
        return Err(AppError::invalid_request(
            format!("no ASL gestures detected in video {file_id}"),
            Some("video"),
            Some("no_gestures"),
        ));
    }

    let translation = state.translator.translate(&recognition.sequence).await?;
    let suggestions = state
        .translator
        .suggestions(&recognition.sequence, SUGGESTION_COUNT)
        .await?;

    let mean_confidence = recognition.mean_confidence();
    let frames_analyzed = recognition.observations.len();
    let result = json!({
        "success": true,
        "file_id": file_id.to_string(),
        "filename": filename,
        "file_size": file_size,
        "upload_time": Utc::now().to_rfc3339(),
        "video": {
            "frame_count": info.frame_count,
            "duration_secs": info.duration_secs,
            "fps": info.fps,
        },
        "asl_recognition": {
            "sequence": recognition.sequence,
            "confidence": mean_confidence,
            "frames_analyzed": frames_analyzed,
            "frames": recognition.observations,
        },
        "translation": {
            "english_text": translation.text,
            "confidence": translation.confidence,
            "suggestions": suggestions,
        },
    });

    let store = Arc::clone(&state.store);
    let persisted = result.clone();
    task::spawn_blocking(move || store.save_result(&file_id, &persisted))
        .await
        .map_err(|err| AppError::internal(format!("result writer task failed: {err}")))??;

    info!(
        file_id = %file_id,
        file_size,
        sequence = %result["asl_recognition"]["sequence"],
        "processed uploaded video"
    );

    Ok(Json(result))
}

/// Streams back a stored video (`GET /video/{file_id}`).
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    require_auth(&state.cfg, &headers)?;
    let id = parse_file_id(&file_id, "video not found")?;

    let store = Arc::clone(&state.store);
    let found = task::spawn_blocking(move || store.read_video(&id))
        .await
        .map_err(|err| AppError::internal(format!("video reader task failed: {err}")))??;

    let (bytes, extension) =
        found.ok_or_else(|| AppError::not_found(format!("video not found for id {file_id}")))?;
    Ok((
        [(header::CONTENT_TYPE, video_content_type(&extension))],
        bytes,
    )
        .into_response())
}

/// Returns a stored processing result (`GET /result/{file_id}`).
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;
    let id = parse_file_id(&file_id, "result not found")?;

    let store = Arc::clone(&state.store);
    let found = task::spawn_blocking(move || store.load_result(&id))
        .await
        .map_err(|err| AppError::internal(format!("result reader task failed: {err}")))??;

    found
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("result not found for id {file_id}")))
}

/// Translates one fingerspelled sequence (`POST /translate`).
pub async fn translate_text(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;

    let asl_text = payload
        .get("asl_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| AppError::invalid_request("ASL text not provided", Some("asl_text"), None))?;

    let translation = state.translator.translate(asl_text).await?;
    let suggestions = state.translator.suggestions(asl_text, SUGGESTION_COUNT).await?;

    Ok(Json(json!({
        "success": true,
        "asl_text": asl_text,
        "processed_asl": translation.prepared_input,
        "translation": translation.text,
        "confidence": translation.confidence,
        "suggestions": suggestions,
    })))
}

/// Translates a list of sequences (`POST /batch_translate`).
///
/// One entry's failure lands in its result slot instead of failing the
/// whole batch.
pub async fn batch_translate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;

    let texts = payload
        .get("asl_texts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AppError::invalid_request("ASL texts must be a list", Some("asl_texts"), None)
        })?;

    let mut results = Vec::with_capacity(texts.len());
    for entry in texts {
        let Some(text) = entry.as_str() else {
            results.push(json!({
                "success": false,
                "error": "entry is not a string",
                "translation": "",
                "confidence": 0.0,
            }));
            continue;
        };

        match state.translator.translate(text).await {
            Ok(translation) => results.push(json!({
                "success": true,
                "original_asl": text,
                "processed_asl": translation.prepared_input,
                "translation": translation.text,
                "confidence": translation.confidence,
            })),
            Err(err) => results.push(json!({
                "success": false,
                "error": err.to_string(),
                "translation": "",
                "confidence": 0.0,
            })),
        }
    }

    Ok(Json(json!({"success": true, "results": results})))
}

/// Lists stored uploads and their results (`GET /files`).
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;

    let store = Arc::clone(&state.store);
    let entries = task::spawn_blocking(move || store.list())
        .await
        .map_err(|err| AppError::internal(format!("listing task failed: {err}")))??;

    let files = entries
        .into_iter()
        .map(|entry| {
            json!({
                "file_id": entry.file_id,
                "video_file": entry.video_file,
                "result": entry.result,
            })
        })
        .collect::<Vec<_>>();

    Ok(Json(json!({"success": true, "files": files})))
}

/// Deletes every file stored under an id (`DELETE /delete/{file_id}`).
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state.cfg, &headers)?;
    let id = parse_file_id(&file_id, "no files found with this id")?;

    let store = Arc::clone(&state.store);
    let deleted = task::spawn_blocking(move || store.delete(&id))
        .await
        .map_err(|err| AppError::internal(format!("delete task failed: {err}")))??;

    if deleted.is_empty() {
        return Err(AppError::not_found(format!(
            "no files found with id {file_id}"
        )));
    }

    info!(file_id = %file_id, count = deleted.len(), "deleted stored files");
    Ok(Json(json!({"success": true, "deleted_files": deleted})))
}

/// Parses and validates the multipart form for the upload endpoint.
async fn parse_video_form(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_multipart(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        if name == "video" {
            let filename = field
                .file_name()
                .map(ToOwned::to_owned)
                .filter(|name| !name.trim().is_empty())
                .ok_or_else(|| {
                    AppError::invalid_request("no file selected", Some("video"), None)
                })?;
            let bytes = field.bytes().await.map_err(|err| {
                AppError::bad_multipart(format!("failed to read file bytes: {err}"))
            })?;
            file_name = Some(filename);
            file_bytes = Some(bytes.to_vec());
        }
    }

    let filename = file_name.ok_or_else(|| {
        AppError::invalid_request("no video file provided", Some("video"), None)
    })?;
    let bytes = file_bytes
        .ok_or_else(|| AppError::invalid_request("missing file content", Some("video"), None))?;
    if bytes.is_empty() {
        return Err(AppError::invalid_request(
            "uploaded file is empty",
            Some("video"),
            Some("empty_file"),
        ));
    }

    Ok((filename, bytes))
}

// Ids are server-generated UUIDs; rejecting anything else keeps path
// segments from reaching the filesystem layer.
fn parse_file_id(raw: &str, not_found_message: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(not_found_message.to_string()))
}

fn video_content_type(extension: &str) -> &'static str {
    match extension {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Enforces optional bearer-token authentication.
fn require_auth(cfg: &AppConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected_api_key) = cfg.api_key.as_deref() else {
        return Ok(());
    };

    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        return Err(AppError::unauthorized("missing bearer token"));
    };

    let value = raw
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    let mut parts = value.split_whitespace();
    let scheme = parts
        .next()
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let token = parts
        .next()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized("missing bearer token"));
    }

    if token != expected_api_key {
        return Err(AppError::unauthorized("invalid token"));
    }

    Ok(())
}
