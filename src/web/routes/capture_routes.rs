use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::success;
use crate::db::services::capture_service;
use crate::services::capture_workflow::{
    IdentifyOutcome, MAX_UPLOAD_BYTES, SaveCaptureRequest, UploadedImage,
};
use crate::web::extract::ApiJson;
use crate::web::models::{AuthenticatedUser, LimitQuery};
use crate::web::{AppError, AppState};

const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 200;
// Room for the multipart framing around a maximum-size image.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

/// JSON view of a gate decision shared by every identify endpoint.
pub(crate) fn outcome_json(outcome: &IdentifyOutcome) -> Value {
    match outcome {
        IdentifyOutcome::Saved { plant, capture } => json!({
            "saved": true,
            "message": format!("Saved: {}", capture.name),
            "plant_id": plant.id,
            "capture_id": capture.id,
            "plant": plant,
            "capture": capture,
        }),
        IdentifyOutcome::NotSaved {
            label,
            confidence,
            plant,
            reason,
        } => json!({
            "saved": false,
            "reason": reason,
            "message": reason.message(label),
            "name": label,
            "confidence": confidence,
            "plant_id": plant.as_ref().map(|p| p.id),
            "plant": plant,
        }),
    }
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
        base_map.extend(extra_map);
    }
    base
}

async fn upload_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some(UploadedImage::validate(data, &filename, &content_type)?);
        break;
    }
    let upload =
        upload.ok_or_else(|| AppError::InvalidInput("No image file provided".to_string()))?;

    let identification = app_state
        .workflow()
        .identify_upload(Some(authenticated_user.id), upload)
        .await?;

    let classification = &identification.classification;
    let body = json!({
        "name": classification.label(),
        "confidence": classification.confidence,
        "file": classification.file,
        "image_url": classification.image_url,
    });
    Ok(success(merge(body, outcome_json(&identification.outcome))))
}

async fn save_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SaveCaptureRequest>,
) -> Result<Json<Value>, AppError> {
    let image_url = payload
        .image_url
        .clone()
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| app_state.device.history_image_url(&payload.file));
    let outcome = app_state
        .workflow()
        .save_result(Some(authenticated_user.id), payload)
        .await?;
    Ok(success(merge(
        json!({ "image_url": image_url }),
        outcome_json(&outcome),
    )))
}

async fn history_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let captures = capture_service::list_user_captures(&app_state.db, authenticated_user.id, limit)
        .await?
        .into_iter()
        .map(|(capture, plant)| {
            let plant = plant.map(|p| {
                json!({ "id": p.id, "name": p.name, "scientific_name": p.scientific_name })
            });
            serde_json::to_value(&capture).map(|row| merge(row, json!({ "plant": plant })))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(success(json!({ "captures": captures })))
}

pub fn create_capture_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/save", post(save_handler))
        .route("/history", get(history_handler))
}
