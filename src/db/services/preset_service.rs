use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde_json::Value;
use thiserror::Error;

use crate::db::entities::{camera_preset, prelude::CameraPreset};

/// Presets built into the device firmware, offered next to the user's own.
pub const SYSTEM_PRESETS: [&str; 13] = [
    "auto",
    "leaf_sharp",
    "leaf_vivid",
    "leaf_macro",
    "leaf_shadow",
    "daylight",
    "cloudy",
    "indoor",
    "night",
    "sport",
    "portrait",
    "document",
    "security",
];

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Preset not found: {0}")]
    NotFound(i32),
    #[error("Preset name must not be empty")]
    EmptyName,
    #[error("Preset settings must be a JSON object")]
    InvalidSettings,
}

pub async fn list_presets(
    db: &impl ConnectionTrait,
    user_id: i32,
) -> Result<Vec<camera_preset::Model>, DbErr> {
    CameraPreset::find()
        .filter(camera_preset::Column::UserId.eq(user_id))
        .order_by_desc(camera_preset::Column::IsDefault)
        .order_by_asc(camera_preset::Column::Name)
        .all(db)
        .await
}

/// Creates the named preset or overwrites the one the user already has
/// under that name. Marking it default clears the flag on the others in
/// the same transaction.
pub async fn save_preset<C>(
    db: &C,
    user_id: i32,
    name: &str,
    settings: Value,
    is_default: bool,
) -> Result<camera_preset::Model, PresetError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(PresetError::EmptyName);
    }
    if !settings.is_object() {
        return Err(PresetError::InvalidSettings);
    }

    let txn = db.begin().await?;
    let now = Utc::now();

    if is_default {
        CameraPreset::update_many()
            .col_expr(camera_preset::Column::IsDefault, Expr::value(false))
            .filter(camera_preset::Column::UserId.eq(user_id))
            .filter(camera_preset::Column::IsDefault.eq(true))
            .exec(&txn)
            .await?;
    }

    let existing = CameraPreset::find()
        .filter(camera_preset::Column::UserId.eq(user_id))
        .filter(camera_preset::Column::Name.eq(name))
        .one(&txn)
        .await?;

    let saved = match existing {
        Some(preset) => {
            let mut active: camera_preset::ActiveModel = preset.into();
            active.settings = Set(settings);
            active.is_default = Set(is_default);
            active.updated_at = Set(now);
            active.update(&txn).await?
        }
        None => {
            camera_preset::ActiveModel {
                user_id: Set(user_id),
                name: Set(name.to_string()),
                settings: Set(settings),
                is_default: Set(is_default),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    txn.commit().await?;
    Ok(saved)
}

pub async fn get_preset(
    db: &impl ConnectionTrait,
    user_id: i32,
    preset_id: i32,
) -> Result<camera_preset::Model, PresetError> {
    CameraPreset::find_by_id(preset_id)
        .filter(camera_preset::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(PresetError::NotFound(preset_id))
}

pub async fn delete_preset(
    db: &impl ConnectionTrait,
    user_id: i32,
    preset_id: i32,
) -> Result<camera_preset::Model, PresetError> {
    let preset = get_preset(db, user_id, preset_id).await?;
    preset.clone().delete(db).await?;
    Ok(preset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{create_user, memory_db};
    use serde_json::json;

    #[tokio::test]
    async fn test_only_one_default_per_user() {
        let db = memory_db().await;
        let user = create_user(&db, "alice").await;
        let other = create_user(&db, "bob").await;

        save_preset(&db, other.id, "mine", json!({}), true).await.unwrap();
        let a = save_preset(&db, user.id, "macro", json!({"zoom": 2}), true).await.unwrap();
        let b = save_preset(&db, user.id, "night", json!({"iso": 800}), true).await.unwrap();

        let presets = list_presets(&db, user.id).await.unwrap();
        let defaults: Vec<i32> = presets.iter().filter(|p| p.is_default).map(|p| p.id).collect();
        assert_eq!(defaults, vec![b.id]);
        assert!(presets.iter().any(|p| p.id == a.id && !p.is_default));

        let theirs = list_presets(&db, other.id).await.unwrap();
        assert!(theirs[0].is_default);
    }

    #[tokio::test]
    async fn test_saving_same_name_overwrites() {
        let db = memory_db().await;
        let user = create_user(&db, "alice").await;
        let first = save_preset(&db, user.id, "macro", json!({"zoom": 2}), false).await.unwrap();
        let second = save_preset(&db, user.id, " macro ", json!({"zoom": 3}), false).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.settings, json!({"zoom": 3}));
        assert_eq!(list_presets(&db, user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_presets_are_private_to_their_owner() {
        let db = memory_db().await;
        let alice = create_user(&db, "alice").await;
        let bob = create_user(&db, "bob").await;
        let preset = save_preset(&db, alice.id, "macro", json!({}), false).await.unwrap();

        assert!(matches!(
            get_preset(&db, bob.id, preset.id).await,
            Err(PresetError::NotFound(_))
        ));
        assert!(matches!(
            delete_preset(&db, bob.id, preset.id).await,
            Err(PresetError::NotFound(_))
        ));
        delete_preset(&db, alice.id, preset.id).await.unwrap();
        assert!(list_presets(&db, alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_blank_name_and_non_object_settings() {
        let db = memory_db().await;
        let user = create_user(&db, "alice").await;
        assert!(matches!(
            save_preset(&db, user.id, "  ", json!({}), false).await,
            Err(PresetError::EmptyName)
        ));
        assert!(matches!(
            save_preset(&db, user.id, "x", json!([1, 2]), false).await,
            Err(PresetError::InvalidSettings)
        ));
    }
}
