use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use tandem_types::api::SendMessageRequest;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Principal;

/// Send to another identity, opening the conversation on first contact.
/// A retry that hit an already stored `client_token` answers 200 with the
/// original message.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let appended = state.chat.send(&principal.subject, req).await?;
    let status = if appended.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(appended.message)))
}
