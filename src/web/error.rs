use axum::{
    Json,
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::services::preset_service::PresetError;
use crate::detection::DetectionError;
use crate::device::DeviceError;
use crate::services::capture_workflow::WorkflowError;
use crate::services::media_store::MediaError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Device error: {0}")]
    DeviceError(String),
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UserAlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::DeviceUnavailable(msg) => {
                error!(error = %msg, "Device unavailable.");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Device unavailable: max retries exceeded".to_string(),
                )
            }
            AppError::DeviceError(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::DetectorUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            internal @ (AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_)) => {
                error!(error = %internal, "Request failed with an internal error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": error_message })),
        )
            .into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(format!("Invalid JSON: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::InvalidInput(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Unavailable { .. } => AppError::DeviceUnavailable(err.to_string()),
            DeviceError::Status { message, .. } => AppError::DeviceError(message),
            DeviceError::Remote(message) => AppError::DeviceError(message),
            DeviceError::InvalidResponse(_) => AppError::DeviceError(err.to_string()),
            DeviceError::InvalidRequest(message) => AppError::InvalidInput(message),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(message) => AppError::InvalidInput(message),
            WorkflowError::EmptyLabel => AppError::InvalidInput(err.to_string()),
            WorkflowError::Device(e) => e.into(),
            WorkflowError::Database(e) => e.into(),
            WorkflowError::Media(e) => e.into(),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::InvalidPath(path) => AppError::InvalidInput(format!("Invalid media path: {path}")),
            MediaError::NotFound(path) => AppError::NotFound(format!("Media file {path} not found")),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<DetectionError> for AppError {
    fn from(err: DetectionError) -> Self {
        match err {
            DetectionError::ModelUnavailable(_) => AppError::DetectorUnavailable(err.to_string()),
            DetectionError::Frame(_) => AppError::DeviceError(err.to_string()),
            DetectionError::EmptyRegion => AppError::InvalidInput(err.to_string()),
            DetectionError::Inference(_) | DetectionError::Image(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<PresetError> for AppError {
    fn from(err: PresetError) -> Self {
        match err {
            PresetError::DbErr(e) => e.into(),
            PresetError::NotFound(id) => AppError::NotFound(format!("Preset {id} not found")),
            PresetError::EmptyName | PresetError::InvalidSettings => {
                AppError::InvalidInput(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_device_errors_map_to_gateway_statuses() {
        let unavailable = DeviceError::Unavailable {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert_eq!(status_of(unavailable.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(DeviceError::Remote("camera busy".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(DeviceError::InvalidRequest("filename is required".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_validation_and_internal_statuses() {
        assert_eq!(
            status_of(WorkflowError::Validation("bad".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::DatabaseError("secret detail".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(PresetError::NotFound(3).into()),
            StatusCode::NOT_FOUND
        );
    }
}
