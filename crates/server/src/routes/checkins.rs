use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::post,
};
use db::models::routine_checkin::RoutineCheckin;
use serde::Deserialize;
use services::services::checkin::CheckinService;
use ts_rs::TS;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::ActingUser, state::AppState};

#[derive(Debug, Default, Deserialize, TS)]
pub struct CompleteCheckin {
    pub notes: Option<String>,
}

/// POST /api/checkins/{checkin_id}/complete
/// Marks the checkin done by the acting user, with optional notes.
pub async fn complete_checkin(
    State(state): State<AppState>,
    Path(checkin_id): Path<Uuid>,
    ActingUser(user_id): ActingUser,
    payload: Option<Json<CompleteCheckin>>,
) -> Result<ResponseJson<ApiResponse<RoutineCheckin>>, ApiError> {
    let notes = payload.and_then(|Json(body)| body.notes);
    let checkin =
        CheckinService::complete(&state.db().pool, checkin_id, user_id, notes.as_deref()).await?;
    Ok(ResponseJson(ApiResponse::success(checkin)))
}

/// POST /api/checkins/{checkin_id}/undo
pub async fn undo_checkin(
    State(state): State<AppState>,
    Path(checkin_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<RoutineCheckin>>, ApiError> {
    let checkin = CheckinService::undo(&state.db().pool, checkin_id).await?;
    Ok(ResponseJson(ApiResponse::success(checkin)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkins/{checkin_id}/complete", post(complete_checkin))
        .route("/checkins/{checkin_id}/undo", post(undo_checkin))
}
