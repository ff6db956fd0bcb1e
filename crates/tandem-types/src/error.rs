use thiserror::Error;

/// Failure taxonomy shared by every component of the conversation subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Malformed or empty input. Not retryable without changing the request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Authenticated, but not a participant of the requested conversation.
    #[error("forbidden")]
    Forbidden,

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transient storage failure; the caller may retry with backoff.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Short machine-readable kind, used in HTTP bodies and gateway error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Forbidden => "forbidden",
            Self::Auth(_) => "auth_error",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}
