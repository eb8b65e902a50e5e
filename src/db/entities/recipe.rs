use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recipes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub plant_id: i32,
    pub created_by: Option<i32>,
    pub name: String,
    pub recipe_type: String,
    pub difficulty: String,
    pub usage_method: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    pub treats: String,
    #[sea_orm(column_type = "Text")]
    pub benefits: String,
    pub main_ingredient: String,
    #[sea_orm(column_type = "Text")]
    pub preparation_steps: String,
    /// Minutes.
    pub preparation_time: i32,
    #[sea_orm(column_type = "Text")]
    pub dosage: String,
    #[sea_orm(column_type = "Text")]
    pub notes: String,
    pub source: String,
    pub is_verified: bool,
    pub popularity: i64,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plant::Entity",
        from = "Column::PlantId",
        to = "super::plant::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Plant,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatedBy",
        to = "super::user::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    Creator,
    #[sea_orm(has_many = "super::recipe_image::Entity")]
    Images,
}

impl Related<super::plant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plant.def()
    }
}

impl Related<super::recipe_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
