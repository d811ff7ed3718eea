use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::header::CONTENT_TYPE,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::note::{CreateNote, Note, UpdateNote};
use serde::Deserialize;
use services::services::{
    notes::{AttachmentView, ComposedNote, MoveNote, NoteWithAttachments, PendingUpload},
    validation::Validate,
};
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;
use utils::response::ApiResponse;

use crate::{error::ApiError, middleware::ActingUser, state::AppState};

/// Request bodies carrying attachments may be this large.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Multipart part holding the note fields as JSON.
const NOTE_DATA_FIELD: &str = "data";

#[derive(Debug, Default, Deserialize, TS)]
pub struct NoteBoardQuery {
    pub sector_id: Option<Uuid>,
}

/// GET /api/notes
/// The whole board, with stored layouts repaired on the way out.
pub async fn note_board(
    State(state): State<AppState>,
    Query(query): Query<NoteBoardQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<NoteWithAttachments>>>, ApiError> {
    let board = state.notes().board(&state.db().pool, query.sector_id).await?;
    Ok(ResponseJson(ApiResponse::success(board)))
}

/// GET /api/notes/{note_id}
pub async fn get_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<NoteWithAttachments>>, ApiError> {
    let note = state.notes().get(&state.db().pool, note_id).await?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// POST /api/notes
/// Accepts a JSON `CreateNote`, or `multipart/form-data` with the note as JSON in a `data`
/// part plus any number of file parts.
pub async fn create_note(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    request: Request,
) -> Result<ResponseJson<ApiResponse<ComposedNote>>, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let (data, uploads) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        read_note_form(multipart).await?
    } else {
        let Json(data) = Json::<CreateNote>::from_request(request, &state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        (data, Vec::new())
    };
    data.validate().map_err(ApiError::Validation)?;

    let composed = state
        .notes()
        .create_with_attachments(&state.db().pool, &data, user_id, uploads)
        .await?;
    let message = if composed.is_partial() {
        "Nota salva, mas alguns anexos falharam"
    } else {
        "Nota salva"
    };
    Ok(ResponseJson(ApiResponse::success_with_message(
        composed, message,
    )))
}

async fn read_note_form(
    mut multipart: Multipart,
) -> Result<(CreateNote, Vec<PendingUpload>), ApiError> {
    let mut data = None;
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field.bytes().await?;
            debug!(file_name = %file_name, size = bytes.len(), "Received note attachment");
            uploads.push(PendingUpload {
                file_name,
                bytes: bytes.to_vec(),
            });
        } else if name == NOTE_DATA_FIELD {
            let text = field.text().await?;
            let parsed: CreateNote = serde_json::from_str(&text)
                .map_err(|e| ApiError::BadRequest(format!("Dados da nota inválidos: {e}")))?;
            data = Some(parsed);
        }
    }
    let data = data.ok_or_else(|| {
        ApiError::BadRequest(format!("Campo '{NOTE_DATA_FIELD}' é obrigatório"))
    })?;
    Ok((data, uploads))
}

/// PUT /api/notes/{note_id}
pub async fn update_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Json(payload): Json<UpdateNote>,
) -> Result<ResponseJson<ApiResponse<NoteWithAttachments>>, ApiError> {
    payload.validate().map_err(ApiError::Validation)?;
    let note = state
        .notes()
        .update(&state.db().pool, note_id, &payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// POST /api/notes/{note_id}/move
/// Body is either `{dx, dy}` or `{x, y}`; the result is snapped to the grid.
pub async fn move_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Json(movement): Json<MoveNote>,
) -> Result<ResponseJson<ApiResponse<Note>>, ApiError> {
    let note = state
        .notes()
        .move_note(&state.db().pool, note_id, movement)
        .await?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// DELETE /api/notes/{note_id}
pub async fn delete_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.notes().delete(&state.db().pool, note_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// GET /api/notes/{note_id}/attachments
pub async fn list_attachments(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<AttachmentView>>>, ApiError> {
    let attachments = state
        .notes()
        .attachments(&state.db().pool, note_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(attachments)))
}

/// POST /api/notes/{note_id}/attachments
/// Stores the first file part of the form.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    ActingUser(user_id): ActingUser,
    mut multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<AttachmentView>>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field.bytes().await?;
            upload = Some(PendingUpload {
                file_name,
                bytes: bytes.to_vec(),
            });
            break;
        }
    }
    let upload =
        upload.ok_or_else(|| ApiError::BadRequest("Nenhum arquivo enviado".to_string()))?;

    let attachment = state
        .notes()
        .add_attachment(&state.db().pool, note_id, upload, user_id)
        .await?;
    info!(note_id = %note_id, attachment_id = %attachment.attachment.id, "Attachment uploaded");
    Ok(ResponseJson(ApiResponse::success(attachment)))
}

/// DELETE /api/notes/attachments/{attachment_id}
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state
        .notes()
        .delete_attachment(&state.db().pool, attachment_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notes", get(note_board).post(create_note))
        .route(
            "/notes/{note_id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/notes/{note_id}/move", post(move_note))
        .route(
            "/notes/{note_id}/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route(
            "/notes/attachments/{attachment_id}",
            delete(delete_attachment),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
