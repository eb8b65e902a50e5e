use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// May correct shared plant metadata.
    pub is_admin: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::capture_result::Entity")]
    CaptureResults,

    #[sea_orm(has_many = "super::camera_preset::Entity")]
    CameraPresets,
}

impl Related<super::capture_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CaptureResults.def()
    }
}

impl Related<super::camera_preset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CameraPresets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
