use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;

use crate::db::entities::{prelude::User, user};

pub async fn find_by_username(
    db: &impl ConnectionTrait,
    username: &str,
) -> Result<Option<user::Model>, DbErr> {
    User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn get_user(db: &impl ConnectionTrait, user_id: i32) -> Result<Option<user::Model>, DbErr> {
    User::find_by_id(user_id).one(db).await
}

pub async fn create_user(
    db: &impl ConnectionTrait,
    username: &str,
    password_hash: &str,
    email: &str,
) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(Some(password_hash.to_string())),
        email: Set(email.to_string()),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        is_admin: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn update_profile(
    db: &impl ConnectionTrait,
    user_id: i32,
    changes: ProfileUpdate,
) -> Result<Option<user::Model>, DbErr> {
    let Some(existing) = get_user(db, user_id).await? else {
        return Ok(None);
    };
    let mut active: user::ActiveModel = existing.into();
    if let Some(email) = changes.email {
        active.email = Set(email.trim().to_string());
    }
    if let Some(first_name) = changes.first_name {
        active.first_name = Set(first_name.trim().to_string());
    }
    if let Some(last_name) = changes.last_name {
        active.last_name = Set(last_name.trim().to_string());
    }
    active.updated_at = Set(Utc::now());
    Ok(Some(active.update(db).await?))
}

pub async fn set_password_hash(
    db: &impl ConnectionTrait,
    user: user::Model,
    password_hash: String,
) -> Result<user::Model, DbErr> {
    let mut active: user::ActiveModel = user.into();
    active.password_hash = Set(Some(password_hash));
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

/// Grants or revokes the admin flag. Returns `None` when no such user exists.
pub async fn set_admin(
    db: &impl ConnectionTrait,
    username: &str,
    is_admin: bool,
) -> Result<Option<user::Model>, DbErr> {
    let Some(existing) = find_by_username(db, username).await? else {
        return Ok(None);
    };
    let mut active: user::ActiveModel = existing.into();
    active.is_admin = Set(is_admin);
    active.updated_at = Set(Utc::now());
    Ok(Some(active.update(db).await?))
}
