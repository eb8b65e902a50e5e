pub mod entities;
pub mod enums;
pub mod schema;
pub mod services;

pub use schema::ensure_schema;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

    use super::entities::{recipe, user};

    /// A fresh in-memory SQLite database with the full schema.
    ///
    /// The pool is pinned to one connection: every new SQLite memory
    /// connection would otherwise see its own empty database.
    pub async fn memory_db() -> DatabaseConnection {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(options).await.unwrap();
        super::ensure_schema(&db).await.unwrap();
        db
    }

    pub async fn create_user(db: &DatabaseConnection, username: &str) -> user::Model {
        super::services::user_service::create_user(
            db,
            username,
            "not-a-real-hash",
            &format!("{username}@example.com"),
        )
        .await
        .unwrap()
    }

    pub async fn insert_recipe(
        db: &DatabaseConnection,
        plant_id: i32,
        name: &str,
        is_verified: bool,
        popularity: i64,
    ) -> recipe::Model {
        let now = Utc::now();
        recipe::ActiveModel {
            plant_id: Set(plant_id),
            created_by: Set(None),
            name: Set(name.to_string()),
            recipe_type: Set("tea".to_string()),
            difficulty: Set("easy".to_string()),
            usage_method: Set("oral".to_string()),
            description: Set(String::new()),
            treats: Set(String::new()),
            benefits: Set(String::new()),
            main_ingredient: Set(String::new()),
            preparation_steps: Set(String::new()),
            preparation_time: Set(10),
            dosage: Set(String::new()),
            notes: Set(String::new()),
            source: Set(String::new()),
            is_verified: Set(is_verified),
            popularity: Set(popularity),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }
}
