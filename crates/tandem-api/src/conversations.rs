use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::IntoResponse,
};

use tandem_types::api::{HistoryQuery, OpenConversationRequest, ReadResponse};
use tandem_types::ids::ConversationId;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Principal;

type IdPath = Result<Path<i64>, PathRejection>;

pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<OpenConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let conversation = state
        .chat
        .open_conversation(&principal.subject, &req.peer_subject)
        .await?;
    Ok(Json(conversation))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.conversations(&principal.subject).await?))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    path: IdPath,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let conversation = state
        .chat
        .conversation(&principal.subject, ConversationId(id))
        .await?;
    Ok(Json(conversation))
}

/// Replay in order. `after_seq` is exclusive; see `MessageLog::list` for
/// the paging defaults.
pub async fn get_messages(
    State(state): State<AppState>,
    path: IdPath,
    query: Result<Query<HistoryQuery>, QueryRejection>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let Query(query) = query?;
    let messages = state
        .chat
        .history(&principal.subject, ConversationId(id), query.after_seq, query.limit)
        .await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    path: IdPath,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let conversation_id = ConversationId(id);
    let unread = state.chat.mark_read(&principal.subject, conversation_id).await?;
    Ok(Json(ReadResponse {
        conversation_id,
        unread,
    }))
}

pub async fn unread(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.unread(&principal.subject).await?))
}
