use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::success;
use crate::device::DeviceApi;
use crate::web::extract::ApiJson;
use crate::web::models::{
    AnalyzeRequest, DevicePresetRequest, LimitQuery, ModeRequest, ResolutionRequest,
    UiSettingsRequest, VideoStartRequest,
};
use crate::web::{AppError, AppState};

const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 500;

async fn status_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let status = app_state.device.get_status().await;
    Ok(success(serde_json::to_value(status)?))
}

async fn pause_stream_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.pause_stream().await?))
}

async fn resume_stream_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.resume_stream().await?))
}

async fn stream_url_handler(State(app_state): State<Arc<AppState>>) -> Json<Value> {
    success(json!({ "stream_url": app_state.device.stream_url() }))
}

async fn capture_preview_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let preview = app_state.device.capture_preview().await?;
    Ok(success(serde_json::to_value(preview)?))
}

async fn analyze_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<AnalyzeRequest>,
) -> Result<Json<Value>, AppError> {
    let classification = app_state.workflow().analyze_capture(&payload.filename).await?;
    let file = classification.file.clone().unwrap_or_else(|| payload.filename.trim().to_string());
    let image_url = classification
        .image_url
        .clone()
        .unwrap_or_else(|| app_state.device.history_image_url(&file));
    Ok(success(json!({
        "name": classification.label(),
        "confidence": classification.confidence,
        "file": file,
        "image_url": image_url,
    })))
}

/// Adds a browser-reachable `image_url` to each history entry that lacks one.
fn with_image_urls(device: &dyn DeviceApi, files: Vec<Value>) -> Vec<Value> {
    files
        .into_iter()
        .map(|entry| match entry {
            Value::String(name) => json!({
                "filename": name,
                "image_url": device.history_image_url(&name),
            }),
            Value::Object(mut map) => {
                let name = map
                    .get("filename")
                    .or_else(|| map.get("file"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(name) = name {
                    map.entry("image_url")
                        .or_insert_with(|| Value::String(device.history_image_url(&name)));
                }
                Value::Object(map)
            }
            other => other,
        })
        .collect()
}

async fn history_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = app_state.device.get_history(limit as u32).await?;
    let files = with_image_urls(app_state.device.as_ref(), history.files);
    Ok(success(json!({ "files": files })))
}

async fn get_settings_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_settings().await?))
}

async fn set_camera_settings_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(settings): ApiJson<Value>,
) -> Result<Json<Value>, AppError> {
    if !settings.is_object() {
        return Err(AppError::InvalidInput("Settings must be a JSON object".to_string()));
    }
    Ok(success(app_state.device.set_camera_settings(&settings).await?))
}

async fn current_settings_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_camera_settings().await?))
}

async fn set_mode_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ModeRequest>,
) -> Result<Json<Value>, AppError> {
    let mode = payload.mode.trim();
    if mode.is_empty() {
        return Err(AppError::InvalidInput("mode is required".to_string()));
    }
    Ok(success(app_state.device.set_mode(mode).await?))
}

async fn device_presets_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_available_presets().await?))
}

async fn apply_device_preset_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<DevicePresetRequest>,
) -> Result<Json<Value>, AppError> {
    let preset = payload.preset.trim();
    if preset.is_empty() {
        return Err(AppError::InvalidInput("preset is required".to_string()));
    }
    Ok(success(app_state.device.apply_preset(preset).await?))
}

async fn resolution_info_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_resolution_info().await?))
}

async fn change_resolution_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ResolutionRequest>,
) -> Result<Json<Value>, AppError> {
    let profile = payload.profile.trim();
    if profile.is_empty() {
        return Err(AppError::InvalidInput("profile is required".to_string()));
    }
    Ok(success(app_state.device.change_resolution(profile).await?))
}

async fn resolution_profiles_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_resolution_profiles().await?))
}

async fn ui_definitions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_ui_settings_definitions().await?))
}

async fn ui_current_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.get_current_ui_settings().await?))
}

async fn ui_apply_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<UiSettingsRequest>,
) -> Result<Json<Value>, AppError> {
    if !payload.ui_settings.is_object() {
        return Err(AppError::InvalidInput("ui_settings must be a JSON object".to_string()));
    }
    Ok(success(
        app_state.device.apply_ui_settings(&payload.ui_settings).await?,
    ))
}

async fn restart_camera_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.restart_camera().await?))
}

async fn reload_model_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.reload_model().await?))
}

async fn video_start_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<VideoStartRequest>,
) -> Result<Json<Value>, AppError> {
    Ok(success(
        app_state.device.start_video_recording(payload.duration).await?,
    ))
}

async fn video_stop_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    Ok(success(app_state.device.stop_video_recording().await?))
}

async fn video_status_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let status = app_state.device.get_video_recording_status().await?;
    Ok(success(serde_json::to_value(status)?))
}

pub fn create_device_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status_handler))
        .route("/stream/pause", post(pause_stream_handler))
        .route("/stream/resume", post(resume_stream_handler))
        .route("/stream-url", get(stream_url_handler))
        .route("/capture/preview", post(capture_preview_handler))
        .route("/capture/analyze", post(analyze_handler))
        .route("/history", get(history_handler))
        .route("/settings", get(get_settings_handler).put(set_camera_settings_handler))
        .route("/settings/current", get(current_settings_handler))
        .route("/settings/mode", post(set_mode_handler))
        .route("/settings/presets", get(device_presets_handler))
        .route("/settings/preset", post(apply_device_preset_handler))
        .route(
            "/settings/resolution",
            get(resolution_info_handler).post(change_resolution_handler),
        )
        .route("/settings/resolution/profiles", get(resolution_profiles_handler))
        .route("/settings/ui/definitions", get(ui_definitions_handler))
        .route("/settings/ui/current", get(ui_current_handler))
        .route("/settings/ui/apply", post(ui_apply_handler))
        .route("/control/restart-camera", post(restart_camera_handler))
        .route("/control/reload-model", post(reload_model_handler))
        .route("/video/start", post(video_start_handler))
        .route("/video/stop", post(video_stop_handler))
        .route("/video/status", get(video_status_handler))
}
