use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A plant species: the label the device classifies into, plus its reference
/// text and the flag deciding whether results for it are stored.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub scientific_name: String,
    pub english_name: String,
    pub vietnamese_name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    pub usage: String,
    #[sea_orm(column_type = "Text")]
    pub common_locations: String,
    #[sea_orm(column_type = "Text")]
    pub biological_info: String,
    #[sea_orm(column_type = "Text")]
    pub medicinal_info: String,
    pub should_save: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::capture_result::Entity")]
    CaptureResults,

    #[sea_orm(has_many = "super::recipe::Entity")]
    Recipes,
}

impl Related<super::capture_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CaptureResults.def()
    }
}

impl Related<super::recipe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
