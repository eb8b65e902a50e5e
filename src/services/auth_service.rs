use axum::{Extension, extract::State};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sea_orm::{DatabaseConnection, DbErr, RuntimeErr};
use std::sync::Arc;
use tracing::info;

use crate::db::entities::user;
use crate::db::services::user_service;
use crate::web::AppState;
use crate::web::error::AppError;
use crate::web::models::{
    AuthenticatedUser, ChangePasswordRequest, Claims, LoginRequest, LoginResponse,
    RegisterRequest, UserResponse,
};

const MIN_PASSWORD_LEN: usize = 8;

fn is_unique_violation(err: &DbErr) -> bool {
    match err {
        DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(e)))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(e))) => e.is_unique_violation(),
        _ => false,
    }
}

pub async fn register_user(
    db: &DatabaseConnection,
    req: RegisterRequest,
) -> Result<UserResponse, AppError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "Username must not be empty and the password needs at least {MIN_PASSWORD_LEN} characters."
        )));
    }

    if user_service::find_by_username(db, username).await?.is_some() {
        return Err(AppError::UserAlreadyExists("Username is already taken.".to_string()));
    }

    let password_hash = hash(&req.password, DEFAULT_COST)
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))?;

    let email = req.email.unwrap_or_default();
    match user_service::create_user(db, username, &password_hash, email.trim()).await {
        Ok(user_model) => {
            info!(user_id = user_model.id, "Registered new user.");
            Ok(UserResponse::from(user_model))
        }
        Err(e) if is_unique_violation(&e) => Err(AppError::UserAlreadyExists(
            "Username is already taken.".to_string(),
        )),
        Err(e) => Err(AppError::DatabaseError(format!("Failed to create user: {e}"))),
    }
}

pub async fn login_user(
    db: &DatabaseConnection,
    req: LoginRequest,
    jwt_secret: &str,
) -> Result<LoginResponse, AppError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Username and password must not be empty.".to_string(),
        ));
    }

    let user = user_service::find_by_username(db, req.username.trim())
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let password_hash = user
        .password_hash
        .as_ref()
        .ok_or(AppError::InvalidCredentials)?;

    let valid_password = verify(&req.password, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?;
    if !valid_password {
        return Err(AppError::InvalidCredentials);
    }

    create_jwt_for_user(&user, jwt_secret)
}

pub fn create_jwt_for_user(user: &user::Model, jwt_secret: &str) -> Result<LoginResponse, AppError> {
    let now = Utc::now();
    let expiration = (now + Duration::hours(24)).timestamp() as usize;

    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        is_admin: user.is_admin,
        exp: expiration,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_ref()),
    )
    .map_err(|e| AppError::TokenCreationError(e.to_string()))?;

    Ok(LoginResponse {
        token,
        user_id: user.id,
        username: user.username.clone(),
    })
}

pub async fn change_password(
    db: &DatabaseConnection,
    user_id: i32,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    if req.new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "The new password needs at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    let user = user_service::get_user(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let current_ok = match user.password_hash.as_deref() {
        Some(stored) => verify(&req.current_password, stored)
            .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?,
        None => false,
    };
    if !current_ok {
        return Err(AppError::InvalidCredentials);
    }
    let new_hash = hash(&req.new_password, DEFAULT_COST)
        .map_err(|e| AppError::PasswordHashingError(e.to_string()))?;
    user_service::set_password_hash(db, user, new_hash).await?;
    info!(user_id, "Password changed.");
    Ok(())
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<axum::Json<UserResponse>, AppError> {
    let user_model = user_service::get_user(&app_state.db, user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;
    Ok(axum::Json(UserResponse::from(user_model)))
}
