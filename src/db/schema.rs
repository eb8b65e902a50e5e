//! Creates the application tables from the entity definitions.
//!
//! Tables are created in foreign-key order and every statement is
//! `IF NOT EXISTS`, so running this on each startup is harmless.

use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{
    camera_preset, capture_result, plant, recipe, recipe_image, user,
};

async fn create_table<E>(db: &impl ConnectionTrait, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let mut table: TableCreateStatement = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    Ok(())
}

fn preset_name_unique_index() -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name("idx-camera_presets-user_id-name")
        .table(camera_preset::Entity)
        .col(camera_preset::Column::UserId)
        .col(camera_preset::Column::Name)
        .unique()
        .to_owned()
}

pub async fn ensure_schema(db: &impl ConnectionTrait) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, plant::Entity).await?;
    create_table(db, &schema, capture_result::Entity).await?;
    create_table(db, &schema, camera_preset::Entity).await?;
    create_table(db, &schema, recipe::Entity).await?;
    create_table(db, &schema, recipe_image::Entity).await?;

    db.execute(backend.build(&preset_name_unique_index())).await?;

    info!(backend = ?backend, "Database schema is up to date.");
    Ok(())
}
