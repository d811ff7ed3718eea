use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, put},
};
use chrono::Utc;
use db::models::task::{CreateTask, Task, TaskFilter, TaskStatus, UpdateTask};
use serde::Deserialize;
use services::services::{
    task_rollup::{TaskDetail, task_detail},
    validation::Validate,
};
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::ActingUser, state::AppState};

#[derive(Debug, Deserialize, TS)]
pub struct UpdateTaskStatus {
    pub status: TaskStatus,
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(filter): Query<TaskFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_filtered(&state.db().pool, &filter).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

/// GET /api/tasks/{task_id}
/// Includes subtasks and the progress rolled up from them.
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<TaskDetail>>, ApiError> {
    let detail = task_detail(&state.db().pool, task_id, Utc::now())
        .await?
        .ok_or(ApiError::NotFound("Tarefa não encontrada"))?;
    Ok(ResponseJson(ApiResponse::success(detail)))
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    user: Option<ActingUser>,
    Json(payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let pool = &state.db().pool;
    if let Some(parent_id) = payload.parent_task_id {
        Task::find_by_id(pool, parent_id)
            .await?
            .ok_or(ApiError::NotFound("Tarefa pai não encontrada"))?;
    }
    let created_by = user.map(|ActingUser(id)| id);
    let task = Task::create(pool, &payload, Uuid::new_v4(), created_by).await?;
    info!(task_id = %task.id, parent_task_id = ?task.parent_task_id, "Created task");
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// PUT /api/tasks/{task_id}
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let task = Task::update(&state.db().pool, task_id, &payload)
        .await?
        .ok_or(ApiError::NotFound("Tarefa não encontrada"))?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// PUT /api/tasks/{task_id}/status
pub async fn update_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTaskStatus>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = Task::update_status(&state.db().pool, task_id, payload.status)
        .await?
        .ok_or(ApiError::NotFound("Tarefa não encontrada"))?;
    info!(task_id = %task_id, status = %task.status, "Task status changed");
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// DELETE /api/tasks/{task_id}
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Task::delete(&state.db().pool, task_id).await? == 0 {
        return Err(ApiError::NotFound("Tarefa não encontrada"));
    }
    info!(task_id = %task_id, "Deleted task");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/{task_id}/status", put(update_task_status))
}
