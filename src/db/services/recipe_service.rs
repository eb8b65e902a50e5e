use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;

use crate::db::entities::{
    plant, prelude::{Recipe, RecipeImage}, recipe, recipe_image,
};

#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: recipe::Model,
    pub plant: Option<plant::Model>,
    pub images: Vec<recipe_image::Model>,
}

/// Verified recipes for a plant, most popular first.
pub async fn list_recipes_for_plant(
    db: &impl ConnectionTrait,
    plant_id: i32,
) -> Result<Vec<recipe::Model>, DbErr> {
    Recipe::find()
        .filter(recipe::Column::PlantId.eq(plant_id))
        .filter(recipe::Column::IsVerified.eq(true))
        .order_by_desc(recipe::Column::Popularity)
        .order_by_asc(recipe::Column::Name)
        .all(db)
        .await
}

/// Loads a recipe for its detail view and counts the view.
///
/// The counter is bumped with `popularity = popularity + 1` in SQL so
/// concurrent views are never lost.
pub async fn get_recipe_detail(
    db: &impl ConnectionTrait,
    recipe_id: i32,
) -> Result<Option<RecipeDetail>, DbErr> {
    let bumped = Recipe::update_many()
        .col_expr(
            recipe::Column::Popularity,
            Expr::col(recipe::Column::Popularity).add(1),
        )
        .filter(recipe::Column::Id.eq(recipe_id))
        .exec(db)
        .await?;
    if bumped.rows_affected == 0 {
        return Ok(None);
    }

    let Some((recipe, plant)) = Recipe::find_by_id(recipe_id)
        .find_also_related(plant::Entity)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let images = RecipeImage::find()
        .filter(recipe_image::Column::RecipeId.eq(recipe_id))
        .order_by_asc(recipe_image::Column::Position)
        .order_by_asc(recipe_image::Column::Id)
        .all(db)
        .await?;

    Ok(Some(RecipeDetail {
        recipe,
        plant,
        images,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::plant_service::get_or_create_plant;
    use crate::db::test_support::{insert_recipe, memory_db};
    use sea_orm::{ActiveModelTrait, Set};

    #[tokio::test]
    async fn test_only_verified_recipes_are_listed_by_popularity() {
        let db = memory_db().await;
        let neem = get_or_create_plant(&db, "Neem").await.unwrap();
        let tea = insert_recipe(&db, neem.id, "Neem tea", true, 3).await;
        let paste = insert_recipe(&db, neem.id, "Neem paste", true, 9).await;
        insert_recipe(&db, neem.id, "Unchecked", false, 50).await;

        let listed: Vec<i32> = list_recipes_for_plant(&db, neem.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, vec![paste.id, tea.id]);
    }

    #[tokio::test]
    async fn test_detail_view_increments_popularity_and_orders_images() {
        let db = memory_db().await;
        let neem = get_or_create_plant(&db, "Neem").await.unwrap();
        let tea = insert_recipe(&db, neem.id, "Neem tea", true, 0).await;
        for (position, caption) in [(2, "second"), (1, "first")] {
            recipe_image::ActiveModel {
                recipe_id: Set(tea.id),
                image: Set(format!("recipes/{caption}.jpg")),
                caption: Set(caption.to_string()),
                position: Set(position),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }

        get_recipe_detail(&db, tea.id).await.unwrap().unwrap();
        let detail = get_recipe_detail(&db, tea.id).await.unwrap().unwrap();
        assert_eq!(detail.recipe.popularity, 2);
        assert_eq!(detail.plant.map(|p| p.id), Some(neem.id));
        let captions: Vec<&str> = detail.images.iter().map(|i| i.caption.as_str()).collect();
        assert_eq!(captions, vec!["first", "second"]);

        assert!(get_recipe_detail(&db, 999).await.unwrap().is_none());
    }
}
