use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::Utc;
use services::services::{
    dashboard::{DashboardQuery, DashboardReport, dashboard},
    query_cache::QueryKey,
    realtime::DASHBOARD_TOPIC,
};
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

/// GET /api/dashboard?group_by=unit|responsible|sector|frequency
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<ResponseJson<ApiResponse<DashboardReport>>, ApiError> {
    let pool = &state.db().pool;
    let now = Utc::now();
    let report = state
        .cache()
        .get_or_fetch(QueryKey::new(DASHBOARD_TOPIC, query.cache_scope(now)), || {
            dashboard(pool, &query, now)
        })
        .await?;
    Ok(ResponseJson(ApiResponse::success(report.as_ref().clone())))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}
