use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use tandem_types::error::ChatError;

use crate::AppState;
use crate::error::ApiError;

/// The verified authentication subject of the current request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
}

/// Extract and validate the bearer token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let subject = {
        let token = bearer_token(req.headers())
            .ok_or_else(|| ChatError::Auth("missing bearer token".into()))?;
        state.verifier.verify(token)?
    };

    req.extensions_mut().insert(Principal { subject });
    Ok(next.run(req).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
