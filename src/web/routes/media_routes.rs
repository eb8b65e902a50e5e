use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;

use crate::web::{AppError, AppState};

/// Serves a stored upload or crop by the relative path kept on its capture.
async fn media_file_handler(
    State(app_state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let data = app_state.media.read(&path).await?;
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        [
            (header::CONTENT_TYPE, content_type.essence_str().to_string()),
            (header::CACHE_CONTROL, "private, max-age=86400".to_string()),
        ],
        data,
    ))
}

pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new().route("/{*path}", get(media_file_handler))
}
