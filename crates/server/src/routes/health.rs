use axum::{
    Router, extract::State, http::StatusCode, response::Json as ResponseJson, routing::get,
};
use services::services::database_validator::{DatabaseValidator, HealthReport};
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

/// GET /api/health
/// Responds 503 while migrations or tables are missing.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<HealthReport>>), ApiError> {
    let report = DatabaseValidator::new(state.db().pool.clone())
        .validate()
        .await?;
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let message = report.summary();
    Ok((
        status,
        ResponseJson(ApiResponse::success_with_message(report, message)),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
