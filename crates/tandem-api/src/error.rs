use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use tandem_types::api::ErrorBody;
use tandem_types::error::ChatError;

/// HTTP face of `ChatError`.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

// Malformed bodies, paths and query strings are the caller's mistake and
// answer with the same JSON error body as everything else.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ChatError::InvalidArgument(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(ChatError::InvalidArgument(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ChatError::InvalidArgument(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ChatError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Forbidden => StatusCode::FORBIDDEN,
            ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
            ChatError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self.0 {
            ChatError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "internal error".to_string()
            }
            ChatError::StoreUnavailable(detail) => {
                error!("Store unavailable: {}", detail);
                self.0.to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message,
        };

        let mut response = (status, Json(body)).into_response();
        if self.0.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outage_is_retryable_503() {
        let response = ApiError(ChatError::StoreUnavailable("database is locked".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn client_errors_map_without_retry_hint() {
        for (err, status) in [
            (ChatError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ChatError::Forbidden, StatusCode::FORBIDDEN),
            (ChatError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (ChatError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), status);
            assert!(response.headers().get(header::RETRY_AFTER).is_none());
        }
    }
}
