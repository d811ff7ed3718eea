use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{
    checkin::CheckinError, database_validator::DatabaseValidationError,
    file_storage::FileStorageError, notes::NoteError, routine_period::RoutinePeriodError,
    validation::FieldError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    RoutinePeriod(#[from] RoutinePeriodError),
    #[error(transparent)]
    Checkin(#[from] CheckinError),
    #[error(transparent)]
    Note(#[from] NoteError),
    #[error(transparent)]
    FileStorage(#[from] FileStorageError),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    /// Carries the user-facing message, e.g. "Setor não encontrado"
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::Checkin(CheckinError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Checkin não encontrado".to_string())
            }
            ApiError::RoutinePeriod(RoutinePeriodError::RoutineNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Rotina não encontrada".to_string())
            }
            ApiError::RoutinePeriod(RoutinePeriodError::RoutineInactive(_)) => (
                StatusCode::BAD_REQUEST,
                "Rotina inativa não pode iniciar período".to_string(),
            ),
            ApiError::RoutinePeriod(RoutinePeriodError::PeriodAlreadyActive { .. }) => (
                StatusCode::CONFLICT,
                "Já existe um período ativo para esta rotina".to_string(),
            ),
            ApiError::RoutinePeriod(RoutinePeriodError::PeriodAwaitingCompletion { .. }) => (
                StatusCode::CONFLICT,
                "O período atual ainda tem checkins pendentes".to_string(),
            ),
            ApiError::Note(NoteError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Nota não encontrada".to_string())
            }
            ApiError::Note(NoteError::AttachmentNotFound(_)) => {
                (StatusCode::NOT_FOUND, "Anexo não encontrado".to_string())
            }
            ApiError::Note(NoteError::OutOfBoard { .. }) => {
                (StatusCode::BAD_REQUEST, "Posição fora do quadro".to_string())
            }
            ApiError::FileStorage(FileStorageError::NotFound(_))
            | ApiError::Note(NoteError::Storage(FileStorageError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "Arquivo não encontrado".to_string())
            }
            ApiError::FileStorage(FileStorageError::InvalidPath(_)) => {
                (StatusCode::BAD_REQUEST, "Caminho de arquivo inválido".to_string())
            }
            ApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "Dados inválidos, verifique os campos".to_string(),
            ),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Multipart(_) => (
                StatusCode::BAD_REQUEST,
                "Não foi possível ler o formulário enviado".to_string(),
            ),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Chave de API inválida".to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Erro interno, tente novamente mais tarde".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        match self {
            ApiError::Validation(errors) => {
                let body = ApiResponse::<(), Vec<FieldError>>::error_with_data(&message, errors);
                (status, ResponseJson(body)).into_response()
            }
            _ => (status, ResponseJson(ApiResponse::<()>::error(&message))).into_response(),
        }
    }
}
