use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::unit::{CreateUnit, Unit, UnitTreeNode, UnitWithLeaf, UpdateUnit};
use serde::Deserialize;
use services::services::{query_cache::QueryKey, validation::Validate};
use tracing::info;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Default, Deserialize)]
pub struct UnitListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/units
pub async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<UnitWithLeaf>>>, ApiError> {
    let pool = &state.db().pool;
    let key = QueryKey::new("units", format!("flat:{}", query.include_inactive));
    let units = state
        .cache()
        .get_or_fetch(key, || Unit::find_all_with_leaf(pool, query.include_inactive))
        .await?;
    Ok(ResponseJson(ApiResponse::success(units.as_ref().clone())))
}

/// GET /api/units/tree
/// Top-level units ("gerências") with their direct children.
pub async fn unit_tree(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<UnitTreeNode>>>, ApiError> {
    let pool = &state.db().pool;
    let tree = state
        .cache()
        .get_or_fetch(QueryKey::new("units", "tree"), || async move {
            Ok::<_, sqlx::Error>(Unit::build_tree(Unit::find_active(pool).await?))
        })
        .await?;
    Ok(ResponseJson(ApiResponse::success(tree.as_ref().clone())))
}

/// POST /api/units
pub async fn create_unit(
    State(state): State<AppState>,
    Json(payload): Json<CreateUnit>,
) -> Result<ResponseJson<ApiResponse<Unit>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let unit = Unit::create(&state.db().pool, &payload, Uuid::new_v4()).await?;
    info!(unit_id = %unit.id, "Created unit");
    Ok(ResponseJson(ApiResponse::success(unit)))
}

/// PUT /api/units/{unit_id}
pub async fn update_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(payload): Json<UpdateUnit>,
) -> Result<ResponseJson<ApiResponse<Unit>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    if payload.parent_id == Some(unit_id) {
        return Err(ApiError::BadRequest(
            "Uma unidade não pode ser pai de si mesma".to_string(),
        ));
    }
    let unit = Unit::update(&state.db().pool, unit_id, &payload)
        .await?
        .ok_or(ApiError::NotFound("Unidade não encontrada"))?;
    Ok(ResponseJson(ApiResponse::success(unit)))
}

/// DELETE /api/units/{unit_id}
/// Soft delete; the unit stops receiving new checkins.
pub async fn delete_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Unit::soft_delete(&state.db().pool, unit_id).await? == 0 {
        return Err(ApiError::NotFound("Unidade não encontrada"));
    }
    info!(unit_id = %unit_id, "Deactivated unit");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/units", get(list_units).post(create_unit))
        .route("/units/tree", get(unit_tree))
        .route("/units/{unit_id}", put(update_unit).delete(delete_unit))
}
