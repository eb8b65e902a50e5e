use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::success;
use crate::db::services::preset_service::{self, SYSTEM_PRESETS};
use crate::web::extract::ApiJson;
use crate::web::models::{AuthenticatedUser, SavePresetRequest};
use crate::web::{AppError, AppState};

async fn list_presets_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let presets = preset_service::list_presets(&app_state.db, authenticated_user.id).await?;
    Ok(success(json!({
        "presets": presets,
        "system_presets": SYSTEM_PRESETS,
    })))
}

async fn save_preset_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SavePresetRequest>,
) -> Result<Json<Value>, AppError> {
    let preset = preset_service::save_preset(
        &app_state.db,
        authenticated_user.id,
        &payload.name,
        payload.settings,
        payload.is_default,
    )
    .await?;
    Ok(success(json!({
        "message": "Preset saved",
        "preset": preset,
    })))
}

async fn apply_preset_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(preset_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let preset = preset_service::get_preset(&app_state.db, authenticated_user.id, preset_id).await?;
    app_state.device.set_camera_settings(&preset.settings).await?;
    Ok(success(json!({
        "message": format!("Applied preset: {}", preset.name),
        "settings": preset.settings,
    })))
}

async fn delete_preset_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(preset_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let deleted =
        preset_service::delete_preset(&app_state.db, authenticated_user.id, preset_id).await?;
    Ok(success(json!({
        "message": format!("Deleted preset: {}", deleted.name),
    })))
}

pub fn create_preset_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_presets_handler).post(save_preset_handler))
        .route("/{preset_id}/apply", post(apply_preset_handler))
        .route("/{preset_id}", delete(delete_preset_handler))
}
