use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use chrono::Utc;
use db::models::{
    routine::{CreateRoutine, Routine, UpdateRoutine},
    routine_checkin::{RoutineCheckin, RoutineCheckinWithUnit},
    routine_period::RoutinePeriod,
};
use serde::{Deserialize, Serialize};
use services::services::{
    completion::CompletionSummary,
    query_cache::QueryKey,
    routine_period::{
        OpenedPeriod, PeriodWithProgress, RoutineDetail, RoutinePeriodService, RoutineWithProgress,
    },
    validation::Validate,
};
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::ActingUser, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RoutineListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct SetRoutineUnits {
    pub unit_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct SetRoutineAssignees {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct PeriodDetail {
    pub period: RoutinePeriod,
    pub checkins: Vec<RoutineCheckinWithUnit>,
    pub summary: CompletionSummary,
}

/// GET /api/routines
/// Cards with the active period's progress. Served from the query cache.
pub async fn list_routines(
    State(state): State<AppState>,
    Query(query): Query<RoutineListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<RoutineWithProgress>>>, ApiError> {
    let pool = &state.db().pool;
    let key = QueryKey::new("routines", format!("cards:{}", query.include_inactive));
    let cards = state
        .cache()
        .get_or_fetch(key, || {
            RoutinePeriodService::list_with_progress(pool, query.include_inactive)
        })
        .await?;
    Ok(ResponseJson(ApiResponse::success(cards.as_ref().clone())))
}

/// GET /api/routines/{routine_id}
pub async fn get_routine(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<RoutineDetail>>, ApiError> {
    let detail = RoutinePeriodService::routine_detail(&state.db().pool, routine_id)
        .await?
        .ok_or(ApiError::NotFound("Rotina não encontrada"))?;
    Ok(ResponseJson(ApiResponse::success(detail)))
}

/// POST /api/routines
pub async fn create_routine(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(payload): Json<CreateRoutine>,
) -> Result<ResponseJson<ApiResponse<Routine>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let routine = Routine::create(&state.db().pool, &payload, Uuid::new_v4(), user_id).await?;
    info!(routine_id = %routine.id, user_id = %user_id, frequency = %routine.frequency, "Created routine");
    Ok(ResponseJson(ApiResponse::success(routine)))
}

/// PUT /api/routines/{routine_id}
pub async fn update_routine(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
    Json(payload): Json<UpdateRoutine>,
) -> Result<ResponseJson<ApiResponse<Routine>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let routine = Routine::update(&state.db().pool, routine_id, &payload)
        .await?
        .ok_or(ApiError::NotFound("Rotina não encontrada"))?;
    Ok(ResponseJson(ApiResponse::success(routine)))
}

/// DELETE /api/routines/{routine_id}
pub async fn delete_routine(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Routine::soft_delete(&state.db().pool, routine_id).await? == 0 {
        return Err(ApiError::NotFound("Rotina não encontrada"));
    }
    info!(routine_id = %routine_id, "Deactivated routine");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// PUT /api/routines/{routine_id}/units
/// Replaces the explicit unit set. An empty list falls back to the default units.
pub async fn set_routine_units(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
    Json(payload): Json<SetRoutineUnits>,
) -> Result<ResponseJson<ApiResponse<Vec<Uuid>>>, ApiError> {
    let pool = &state.db().pool;
    Routine::find_by_id(pool, routine_id)
        .await?
        .ok_or(ApiError::NotFound("Rotina não encontrada"))?;
    Routine::set_unit_ids(pool, routine_id, &payload.unit_ids).await?;
    Ok(ResponseJson(ApiResponse::success(
        Routine::find_unit_ids(pool, routine_id).await?,
    )))
}

/// PUT /api/routines/{routine_id}/assignees
pub async fn set_routine_assignees(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
    Json(payload): Json<SetRoutineAssignees>,
) -> Result<ResponseJson<ApiResponse<Vec<Uuid>>>, ApiError> {
    let pool = &state.db().pool;
    Routine::find_by_id(pool, routine_id)
        .await?
        .ok_or(ApiError::NotFound("Rotina não encontrada"))?;
    Routine::set_assignee_ids(pool, routine_id, &payload.user_ids).await?;
    Ok(ResponseJson(ApiResponse::success(
        Routine::find_assignee_ids(pool, routine_id).await?,
    )))
}

/// POST /api/routines/{routine_id}/periods
/// Starts the period covering now ("Iniciar Período")
pub async fn start_period(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<OpenedPeriod>>, ApiError> {
    let opened = RoutinePeriodService::start_current_period(
        &state.db().pool,
        routine_id,
        Utc::now(),
        state.config().timezone,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success_with_message(
        opened,
        "Período iniciado",
    )))
}

/// GET /api/routines/{routine_id}/periods
pub async fn period_history(
    State(state): State<AppState>,
    Path(routine_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<PeriodWithProgress>>>, ApiError> {
    let pool = &state.db().pool;
    Routine::find_by_id(pool, routine_id)
        .await?
        .ok_or(ApiError::NotFound("Rotina não encontrada"))?;
    let history = RoutinePeriodService::history(pool, routine_id).await?;
    Ok(ResponseJson(ApiResponse::success(history)))
}

/// GET /api/periods/{period_id}
pub async fn get_period(
    State(state): State<AppState>,
    Path(period_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<PeriodDetail>>, ApiError> {
    let pool = &state.db().pool;
    let period = RoutinePeriod::find_by_id(pool, period_id)
        .await?
        .ok_or(ApiError::NotFound("Período não encontrado"))?;
    let checkins = RoutineCheckin::find_by_period_with_unit(pool, period_id).await?;
    let summary = CompletionSummary::from_checkins(checkins.iter().map(|c| &c.checkin));
    Ok(ResponseJson(ApiResponse::success(PeriodDetail {
        period,
        checkins,
        summary,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/routines", get(list_routines).post(create_routine))
        .route(
            "/routines/{routine_id}",
            get(get_routine).put(update_routine).delete(delete_routine),
        )
        .route("/routines/{routine_id}/units", put(set_routine_units))
        .route("/routines/{routine_id}/assignees", put(set_routine_assignees))
        .route(
            "/routines/{routine_id}/periods",
            get(period_history).post(start_period),
        )
        .route("/periods/{period_id}", get(get_period))
}
