use axum::{
    Json, Router,
    extract::State,
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::detection::DetectionOverlay;
use crate::device::DeviceApi;
use crate::server::config::ServerConfig;
use crate::services::auth_service;
use crate::services::capture_workflow::CaptureWorkflow;
use crate::services::media_store::MediaStore;
use crate::web::{
    extract::ApiJson,
    middleware::auth::{self, AUTH_COOKIE},
    models::{LoginRequest, RegisterRequest},
    routes::*,
};

pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::AppError;

pub struct AppState {
    pub db: DatabaseConnection,
    pub device: Arc<dyn DeviceApi>,
    pub detection: Arc<DetectionOverlay>,
    pub media: MediaStore,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn workflow(&self) -> CaptureWorkflow<'_> {
        CaptureWorkflow::new(self.device.as_ref(), &self.db, &self.media)
    }
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<Json<Value>, AppError> {
    let user = auth_service::register_user(&app_state.db, payload).await?;
    Ok(routes::success(json!({ "user": user })))
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let login_response =
        auth_service::login_user(&app_state.db, payload, &app_state.config.jwt_secret).await?;

    let auth_cookie = Cookie::build((AUTH_COOKIE, login_response.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(app_state.config.cookie_secure)
        .build();

    Ok((
        jar.add(auth_cookie),
        routes::success(serde_json::to_value(login_response)?),
    ))
}

async fn logout_handler(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        jar.remove(Cookie::build(AUTH_COOKIE).path("/")),
        routes::success(json!({ "message": "Logged out" })),
    )
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let require_auth = || axum_middleware::from_fn_with_state(app_state.clone(), auth::auth);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(auth_service::me).route_layer(require_auth()))
        .nest(
            "/api/user",
            user_routes::create_user_router().route_layer(require_auth()),
        )
        .nest(
            "/api/device",
            device_routes::create_device_router().route_layer(require_auth()),
        )
        .nest(
            "/api/captures",
            capture_routes::create_capture_router().route_layer(require_auth()),
        )
        .nest(
            "/api/detection",
            detection_routes::create_detection_router().route_layer(require_auth()),
        )
        .nest(
            "/api/presets",
            preset_routes::create_preset_router().route_layer(require_auth()),
        )
        .nest(
            "/api/media",
            media_routes::create_media_router().route_layer(require_auth()),
        )
        .nest(
            "/api/plants",
            plant_routes::create_plant_router().route_layer(require_auth()),
        )
        .nest(
            "/api/recipes",
            plant_routes::create_recipe_router().route_layer(require_auth()),
        )
        .with_state(app_state.clone())
        .layer(cors)
}
