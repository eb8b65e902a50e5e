use chrono::Utc;
use sea_orm::sea_query::{Expr, Func, LikeExpr, OnConflict};
use sea_orm::{
    ActiveModelTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use tracing::info;

use crate::db::entities::{plant, prelude::Plant};

/// Labels the classifier emits for frames that contain no usable leaf.
/// Compared case-insensitively; never persisted and never listed.
pub const SENTINEL_LABELS: [&str; 2] = ["background", "green_but_not_leaf"];

pub fn is_sentinel_label(label: &str) -> bool {
    let label = label.trim();
    SENTINEL_LABELS
        .iter()
        .any(|sentinel| sentinel.eq_ignore_ascii_case(label))
}

fn lower_eq(column: plant::Column, value: &str) -> sea_orm::sea_query::SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(value.to_lowercase())
}

fn not_sentinel() -> Condition {
    Condition::all().add(
        Expr::expr(Func::lower(Expr::col(plant::Column::Name)))
            .is_not_in(SENTINEL_LABELS.iter().copied()),
    )
}

/// Finds the plant a classifier label refers to.
///
/// A case-insensitive match on `name` wins over one on `scientific_name`.
/// Within either field the row with the lowest id is returned.
pub async fn resolve_plant(
    db: &impl ConnectionTrait,
    label: &str,
) -> Result<Option<plant::Model>, DbErr> {
    let label = label.trim();
    if label.is_empty() {
        return Ok(None);
    }

    for column in [plant::Column::Name, plant::Column::ScientificName] {
        let found = Plant::find()
            .filter(lower_eq(column, label))
            .order_by_asc(plant::Column::Id)
            .one(db)
            .await?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Resolves `label`, creating a plant named after it when nothing matches.
///
/// The insert is `ON CONFLICT (name) DO NOTHING`, so when two requests race
/// on the same label the row written first is returned to both.
pub async fn get_or_create_plant(
    db: &impl ConnectionTrait,
    label: &str,
) -> Result<plant::Model, DbErr> {
    let label = label.trim();
    if label.is_empty() {
        return Err(DbErr::Custom("Plant label must not be empty".to_string()));
    }
    if let Some(existing) = resolve_plant(db, label).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let new_plant = plant::ActiveModel {
        name: Set(label.to_string()),
        scientific_name: Set(label.to_string()),
        english_name: Set(String::new()),
        vietnamese_name: Set(String::new()),
        description: Set(String::new()),
        usage: Set(String::new()),
        common_locations: Set(String::new()),
        biological_info: Set(String::new()),
        medicinal_info: Set(String::new()),
        should_save: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let inserted = Plant::insert(new_plant)
        .on_conflict(
            OnConflict::column(plant::Column::Name)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        info!(label = %label, "Created plant for new label.");
    }

    resolve_plant(db, label)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("plant '{label}' after insert")))
}

pub async fn get_plant(db: &impl ConnectionTrait, id: i32) -> Result<Option<plant::Model>, DbErr> {
    Plant::find_by_id(id).one(db).await
}

/// Lists plants alphabetically, leaving out sentinel rows.
pub async fn list_plants(
    db: &impl ConnectionTrait,
    limit: u64,
) -> Result<Vec<plant::Model>, DbErr> {
    Plant::find()
        .filter(not_sentinel())
        .order_by_asc(plant::Column::Name)
        .limit(limit)
        .all(db)
        .await
}

/// Makes `%`, `_` and the escape character match themselves in a LIKE pattern.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive substring search across every name field.
pub async fn search_plants(
    db: &impl ConnectionTrait,
    query: &str,
    limit: u64,
) -> Result<Vec<plant::Model>, DbErr> {
    let query = query.trim();
    if query.is_empty() {
        return list_plants(db, limit).await;
    }
    let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
    let any_name = [
        plant::Column::Name,
        plant::Column::ScientificName,
        plant::Column::EnglishName,
        plant::Column::VietnameseName,
    ]
    .into_iter()
    .fold(Condition::any(), |cond, column| {
        cond.add(
            Expr::expr(Func::lower(Expr::col(column)))
                .like(LikeExpr::new(pattern.as_str()).escape('\\')),
        )
    });

    Plant::find()
        .filter(not_sentinel())
        .filter(any_name)
        .order_by_asc(plant::Column::Name)
        .limit(limit)
        .all(db)
        .await
}

/// Metadata correction. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct PlantUpdate {
    pub scientific_name: Option<String>,
    pub english_name: Option<String>,
    pub vietnamese_name: Option<String>,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub common_locations: Option<String>,
    pub biological_info: Option<String>,
    pub medicinal_info: Option<String>,
    pub should_save: Option<bool>,
}

pub async fn update_plant(
    db: &impl ConnectionTrait,
    id: i32,
    changes: PlantUpdate,
) -> Result<Option<plant::Model>, DbErr> {
    let Some(existing) = Plant::find_by_id(id).one(db).await? else {
        return Ok(None);
    };

    let mut active: plant::ActiveModel = existing.into();
    if let Some(v) = changes.scientific_name {
        active.scientific_name = Set(v);
    }
    if let Some(v) = changes.english_name {
        active.english_name = Set(v);
    }
    if let Some(v) = changes.vietnamese_name {
        active.vietnamese_name = Set(v);
    }
    if let Some(v) = changes.description {
        active.description = Set(v);
    }
    if let Some(v) = changes.usage {
        active.usage = Set(v);
    }
    if let Some(v) = changes.common_locations {
        active.common_locations = Set(v);
    }
    if let Some(v) = changes.biological_info {
        active.biological_info = Set(v);
    }
    if let Some(v) = changes.medicinal_info {
        active.medicinal_info = Set(v);
    }
    if let Some(v) = changes.should_save {
        active.should_save = Set(v);
    }
    active.updated_at = Set(Utc::now());

    Ok(Some(active.update(db).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;
    use sea_orm::PaginatorTrait;

    #[test]
    fn test_sentinel_labels_ignore_case_and_padding() {
        assert!(is_sentinel_label("Background"));
        assert!(is_sentinel_label("  GREEN_BUT_NOT_LEAF "));
        assert!(!is_sentinel_label("Neem"));
        assert!(!is_sentinel_label(""));
    }

    #[tokio::test]
    async fn test_get_or_create_is_case_insensitive() {
        let db = memory_db().await;
        let first = get_or_create_plant(&db, "Foo").await.unwrap();
        let second = get_or_create_plant(&db, "fOO").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Foo");
        assert_eq!(first.scientific_name, "Foo");
        assert!(first.should_save);
        assert_eq!(Plant::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_name_match_beats_scientific_name_match() {
        let db = memory_db().await;
        let by_scientific = get_or_create_plant(&db, "Basil").await.unwrap();
        update_plant(
            &db,
            by_scientific.id,
            PlantUpdate {
                scientific_name: Some("Tulsi".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Only the scientific name matches so far.
        let resolved = resolve_plant(&db, "tulsi").await.unwrap().unwrap();
        assert_eq!(resolved.id, by_scientific.id);

        let by_name = get_or_create_plant(&db, "TULSI").await.unwrap();
        assert_eq!(by_name.id, by_scientific.id);

        let now = Utc::now();
        let exact = plant::ActiveModel {
            name: Set("tulsi".to_string()),
            scientific_name: Set("Ocimum tenuiflorum".to_string()),
            english_name: Set(String::new()),
            vietnamese_name: Set(String::new()),
            description: Set(String::new()),
            usage: Set(String::new()),
            common_locations: Set(String::new()),
            biological_info: Set(String::new()),
            medicinal_info: Set(String::new()),
            should_save: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        let resolved = resolve_plant(&db, "Tulsi").await.unwrap().unwrap();
        assert_eq!(resolved.id, exact.id);
    }

    #[tokio::test]
    async fn test_listing_hides_sentinels() {
        let db = memory_db().await;
        for label in ["Neem", "Background", "Aloe", "green_but_not_leaf"] {
            get_or_create_plant(&db, label).await.unwrap();
        }
        let names: Vec<String> = list_plants(&db, 50)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Aloe", "Neem"]);

        let found = search_plants(&db, "ee", 50).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Neem");
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let db = memory_db().await;
        for label in ["Neem", "Aloe 100%", "Mint_leaf"] {
            get_or_create_plant(&db, label).await.unwrap();
        }
        let names = |plants: Vec<plant::Model>| -> Vec<String> {
            plants.into_iter().map(|p| p.name).collect()
        };
        assert_eq!(names(search_plants(&db, "%", 50).await.unwrap()), vec!["Aloe 100%"]);
        assert_eq!(names(search_plants(&db, "_", 50).await.unwrap()), vec!["Mint_leaf"]);
        assert!(search_plants(&db, "n_em", 50).await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
        assert_eq!(escape_like("neem"), "neem");
    }

    #[tokio::test]
    async fn test_update_missing_plant_returns_none() {
        let db = memory_db().await;
        let updated = update_plant(&db, 42, PlantUpdate::default()).await.unwrap();
        assert!(updated.is_none());
    }
}
