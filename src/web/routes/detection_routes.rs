use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use super::capture_routes::outcome_json;
use super::success;
use crate::services::capture_workflow::IdentifyOutcome;
use crate::services::media_store::MediaKind;
use crate::web::extract::ApiJson;
use crate::web::models::{AuthenticatedUser, CropRequest, LeafQuery};
use crate::web::{AppError, AppState};

async fn detect_leaves_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LeafQuery>,
) -> Result<Json<Value>, AppError> {
    let result = app_state.detection.detect_leaves(query.confidence).await?;
    Ok(success(serde_json::to_value(result)?))
}

async fn crop_leaf_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CropRequest>,
) -> Result<Json<Value>, AppError> {
    let crop = app_state.detection.crop_leaf(payload.bbox).await?;
    let mut body = serde_json::to_value(&crop)?;

    // A crop that cannot be stored is still returned to the caller.
    let stored = match app_state
        .media
        .save(MediaKind::Crops, "crop", "jpg", &crop.jpeg)
        .await
    {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "Failed to store cropped leaf.");
            body["save_error"] = Value::String(e.to_string());
            None
        }
    };
    body["stored_image"] = json!(stored);

    if payload.auto_analyze {
        let analysis = app_state
            .workflow()
            .identify_crop(Some(authenticated_user.id), Bytes::from(crop.jpeg), stored)
            .await;
        match analysis {
            Ok(identification) => {
                let classification = &identification.classification;
                body["analysis"] = json!({
                    "name": classification.label(),
                    "confidence": classification.confidence,
                    "file": classification.file,
                    "outcome": outcome_json(&identification.outcome),
                });
                body["saved_to_history"] = Value::Bool(identification.outcome.is_saved());
                if let IdentifyOutcome::Saved { capture, .. } = &identification.outcome {
                    body["capture_id"] = json!(capture.id);
                }
            }
            Err(e) => {
                warn!(error = %e, "Analysis of cropped leaf failed.");
                body["saved_to_history"] = Value::Bool(false);
                body["analysis_error"] = Value::String(e.to_string());
            }
        }
    }

    Ok(success(body))
}

pub fn create_detection_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leaves", get(detect_leaves_handler))
        .route("/crop", post(crop_leaf_handler))
}
