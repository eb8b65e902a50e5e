use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::success;
use crate::db::services::plant_service::{self, PlantUpdate};
use crate::db::services::{capture_service, recipe_service};
use crate::web::extract::ApiJson;
use crate::web::models::{AuthenticatedUser, PlantQuery};
use crate::web::{AppError, AppState};

const DEFAULT_PLANT_LIMIT: u64 = 100;
const MAX_PLANT_LIMIT: u64 = 500;
const RECENT_CAPTURES: u64 = 10;

async fn list_plants_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<PlantQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PLANT_LIMIT)
        .clamp(1, MAX_PLANT_LIMIT);
    let plants = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => plant_service::search_plants(&app_state.db, q, limit).await?,
        _ => plant_service::list_plants(&app_state.db, limit).await?,
    };
    Ok(success(json!({ "plants": plants })))
}

async fn plant_detail_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(plant_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let plant = plant_service::get_plant(&app_state.db, plant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plant {plant_id} not found")))?;
    let recent_captures = capture_service::recent_captures_for_plant(
        &app_state.db,
        plant.id,
        authenticated_user.id,
        RECENT_CAPTURES,
    )
    .await?;
    let recipes = recipe_service::list_recipes_for_plant(&app_state.db, plant.id).await?;
    Ok(success(json!({
        "plant": plant,
        "recent_captures": recent_captures,
        "recipes": recipes,
    })))
}

async fn update_plant_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(plant_id): Path<i32>,
    ApiJson(payload): ApiJson<PlantUpdate>,
) -> Result<Json<Value>, AppError> {
    // Plants are shared by every user.
    if !authenticated_user.is_admin {
        return Err(AppError::Forbidden(
            "Only administrators can edit plant details".to_string(),
        ));
    }
    let plant = plant_service::update_plant(&app_state.db, plant_id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plant {plant_id} not found")))?;
    Ok(success(json!({ "plant": plant })))
}

async fn recipe_detail_handler(
    State(app_state): State<Arc<AppState>>,
    Path(recipe_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let detail = recipe_service::get_recipe_detail(&app_state.db, recipe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Recipe {recipe_id} not found")))?;
    Ok(success(json!({ "recipe": detail })))
}

pub fn create_plant_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_plants_handler))
        .route("/{plant_id}", get(plant_detail_handler).put(update_plant_handler))
}

pub fn create_recipe_router() -> Router<Arc<AppState>> {
    Router::new().route("/{recipe_id}", get(recipe_detail_handler))
}
