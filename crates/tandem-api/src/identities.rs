use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use tandem_types::api::RegisterIdentityRequest;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Principal;

/// Onboard the caller. 201 on first registration, 200 with the stored
/// record afterwards.
pub async fn register(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<RegisterIdentityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (identity, created) = state.chat.register(&principal.subject, req).await?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(identity)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.chat.me(&principal.subject).await?))
}
