use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::entities::user;
use crate::detection::BoundingBox;

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            is_admin: model.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: i32,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub user_id: i32,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize,
}

/// Struct to hold authenticated user details, to be passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct DevicePresetRequest {
    pub preset: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    pub profile: String,
}

#[derive(Debug, Deserialize)]
pub struct UiSettingsRequest {
    pub ui_settings: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoStartRequest {
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LeafQuery {
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct CropRequest {
    pub bbox: BoundingBox,
    #[serde(default)]
    pub auto_analyze: bool,
}

#[derive(Debug, Deserialize)]
pub struct SavePresetRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default = "empty_object")]
    pub settings: Value,
    #[serde(default)]
    pub is_default: bool,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Deserialize)]
pub struct PlantQuery {
    pub limit: Option<u64>,
    pub q: Option<String>,
}
