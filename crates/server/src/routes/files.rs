use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use services::services::file_storage::guess_mime;

use crate::{error::ApiError, state::AppState};

/// GET /api/files/{*key}
/// Serves stored blobs by key. Keys carry a random token, so the route is public.
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.storage().download(&key).await?;
    let content_type =
        guess_mime(&key).unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/files/{*key}", get(download_file))
}
