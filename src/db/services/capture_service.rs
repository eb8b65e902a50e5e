use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value;
use thiserror::Error;

use crate::db::entities::{capture_result, plant, prelude::CaptureResult};
use crate::db::enums::CaptureSource;

#[derive(Debug, Error)]
pub enum CaptureServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("A successful capture must carry a non-empty label")]
    EmptyLabel,
}

#[derive(Debug, Clone)]
pub struct NewCapture {
    pub user_id: Option<i32>,
    pub plant_id: Option<i32>,
    pub name: String,
    pub confidence: Option<f64>,
    pub image_file: String,
    pub local_image: Option<String>,
    pub source: CaptureSource,
    pub success: bool,
    pub raw: Value,
}

/// Appends one capture row. Rows are never updated afterwards.
pub async fn record_capture(
    db: &impl ConnectionTrait,
    new: NewCapture,
) -> Result<capture_result::Model, CaptureServiceError> {
    let name = new.name.trim().to_string();
    if new.success && name.is_empty() {
        return Err(CaptureServiceError::EmptyLabel);
    }

    let row = capture_result::ActiveModel {
        user_id: Set(new.user_id),
        plant_id: Set(new.plant_id),
        name: Set(name),
        confidence: Set(new.confidence),
        image_file: Set(new.image_file),
        local_image: Set(new.local_image),
        source: Set(new.source),
        success: Set(new.success),
        raw: Set(new.raw),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    Ok(row.insert(db).await?)
}

pub async fn get_capture(
    db: &impl ConnectionTrait,
    id: i32,
) -> Result<Option<capture_result::Model>, DbErr> {
    CaptureResult::find_by_id(id).one(db).await
}

/// The user's captures, newest first, each with its plant if it still exists.
pub async fn list_user_captures(
    db: &impl ConnectionTrait,
    user_id: i32,
    limit: u64,
) -> Result<Vec<(capture_result::Model, Option<plant::Model>)>, DbErr> {
    CaptureResult::find()
        .filter(capture_result::Column::UserId.eq(user_id))
        .order_by_desc(capture_result::Column::CreatedAt)
        .order_by_desc(capture_result::Column::Id)
        .limit(limit)
        .find_also_related(plant::Entity)
        .all(db)
        .await
}

pub async fn recent_captures_for_plant(
    db: &impl ConnectionTrait,
    plant_id: i32,
    user_id: i32,
    limit: u64,
) -> Result<Vec<capture_result::Model>, DbErr> {
    CaptureResult::find()
        .filter(capture_result::Column::PlantId.eq(plant_id))
        .filter(capture_result::Column::UserId.eq(user_id))
        .order_by_desc(capture_result::Column::CreatedAt)
        .order_by_desc(capture_result::Column::Id)
        .limit(limit)
        .all(db)
        .await
}
