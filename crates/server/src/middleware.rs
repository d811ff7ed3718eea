use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Query, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

pub const API_KEY_HEADER: &str = "apikey";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Rejects requests without the configured key, sent as the `apikey` header or, for
/// `EventSource` clients that cannot set headers, as the `apikey` query parameter.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = state.config().api_key.as_str();
    let from_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    let from_query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(API_KEY_HEADER));

    match from_header.or(from_query.as_deref()) {
        Some(key) if key == expected => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

/// The user performing the request, from the `x-user-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

fn parse_user(parts: &Parts) -> Option<Result<ActingUser, ApiError>> {
    let raw = parts.headers.get(USER_ID_HEADER)?;
    Some(
        raw.to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(ActingUser)
            .ok_or_else(|| ApiError::BadRequest("Cabeçalho x-user-id inválido".to_string())),
    )
}

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_user(parts).unwrap_or_else(|| {
            Err(ApiError::BadRequest(
                "Cabeçalho x-user-id é obrigatório".to_string(),
            ))
        })
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        parse_user(parts).transpose()
    }
}
