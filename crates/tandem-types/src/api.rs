use serde::{Deserialize, Serialize};

use crate::ids::ConversationId;

// -- JWT Claims --

/// Bearer token claims. `sub` is the external authentication subject; the
/// internal numeric identity is resolved from it on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Identities --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterIdentityRequest {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenConversationRequest {
    pub peer_subject: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only messages with `seq` strictly greater than this.
    pub after_seq: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub conversation_id: ConversationId,
    pub unread: u64,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_subject: String,
    pub text: String,
    /// Client-chosen token that makes retries of the same send idempotent.
    #[serde(default)]
    pub client_token: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
