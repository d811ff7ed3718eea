use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::sector::{CreateSector, Sector, UpdateSector};
use services::services::{query_cache::QueryKey, validation::Validate};
use tracing::info;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

/// GET /api/sectors
pub async fn list_sectors(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<Sector>>>, ApiError> {
    let pool = &state.db().pool;
    let sectors = state
        .cache()
        .get_or_fetch(QueryKey::new("sectors", "all"), || Sector::find_all(pool))
        .await?;
    Ok(ResponseJson(ApiResponse::success(sectors.as_ref().clone())))
}

/// POST /api/sectors
pub async fn create_sector(
    State(state): State<AppState>,
    Json(payload): Json<CreateSector>,
) -> Result<ResponseJson<ApiResponse<Sector>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let sector = Sector::create(&state.db().pool, &payload, Uuid::new_v4()).await?;
    info!(sector_id = %sector.id, "Created sector");
    Ok(ResponseJson(ApiResponse::success(sector)))
}

/// PUT /api/sectors/{sector_id}
pub async fn update_sector(
    State(state): State<AppState>,
    Path(sector_id): Path<Uuid>,
    Json(payload): Json<UpdateSector>,
) -> Result<ResponseJson<ApiResponse<Sector>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let sector = Sector::update(&state.db().pool, sector_id, &payload)
        .await?
        .ok_or(ApiError::NotFound("Setor não encontrado"))?;
    Ok(ResponseJson(ApiResponse::success(sector)))
}

/// DELETE /api/sectors/{sector_id}
pub async fn delete_sector(
    State(state): State<AppState>,
    Path(sector_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Sector::delete(&state.db().pool, sector_id).await? == 0 {
        return Err(ApiError::NotFound("Setor não encontrado"));
    }
    info!(sector_id = %sector_id, "Deleted sector");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sectors", get(list_sectors).post(create_sector))
        .route("/sectors/{sector_id}", put(update_sector).delete(delete_sector))
}
