use axum::{
    Json, Router,
    extract::{Extension, State},
    routing::{get, put},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::success;
use crate::{
    db::services::user_service::{self, ProfileUpdate},
    services::auth_service,
    web::{
        AppError, AppState,
        extract::ApiJson,
        models::{AuthenticatedUser, ChangePasswordRequest, UserResponse},
    },
};

pub fn create_user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/password", put(update_password))
}

async fn get_profile(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let user = user_service::get_user(&app_state.db, auth_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(success(json!({ "user": UserResponse::from(user) })))
}

async fn update_profile(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ProfileUpdate>,
) -> Result<Json<Value>, AppError> {
    let updated = user_service::update_profile(&app_state.db, auth_user.id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(success(json!({
        "message": "Profile updated",
        "user": UserResponse::from(updated),
    })))
}

async fn update_password(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    auth_service::change_password(&app_state.db, auth_user.id, payload).await?;
    Ok(success(json!({ "message": "Password updated successfully" })))
}
