use std::sync::Arc;

use tandem_db::log::Appended;
use tandem_db::{LogStore, blocking};
use tandem_types::error::ChatError;
use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::Message;

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MAX_CLIENT_TOKEN_LEN: usize = 64;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

/// Append-only, per-conversation ordered message store.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<LogStore>,
}

impl MessageLog {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Reject empty, whitespace-only or oversized text before anything is
    /// persisted.
    pub fn validate(text: &str, client_token: Option<&str>) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidArgument("message text is empty".into()));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::InvalidArgument(format!(
                "message text exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        if let Some(token) = client_token {
            if token.is_empty() || token.len() > MAX_CLIENT_TOKEN_LEN {
                return Err(ChatError::InvalidArgument(format!(
                    "client_token must be 1-{} bytes",
                    MAX_CLIENT_TOKEN_LEN
                )));
            }
        }
        Ok(())
    }

    /// Append a message. The ordering key comes from the log, never from the
    /// client. Safe to retry; pass the same `client_token` to deduplicate.
    pub async fn append(
        &self,
        conversation_id: ConversationId,
        sender_id: IdentityId,
        text: String,
        client_token: Option<String>,
    ) -> Result<Appended, ChatError> {
        Self::validate(&text, client_token.as_deref())?;

        Ok(blocking(&self.store, move |log| {
            log.append_message(conversation_id, sender_id, &text, client_token.as_deref())
        })
        .await?)
    }

    /// Replay a conversation in order. With neither `after_seq` nor `limit`
    /// the whole log is returned; otherwise one page.
    pub async fn list(
        &self,
        conversation_id: ConversationId,
        after_seq: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ChatError> {
        let limit = match (after_seq, limit) {
            (None, None) => None,
            (_, limit) => Some(limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
        };

        Ok(blocking(&self.store, move |log| log.messages(conversation_id, after_seq, limit)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_and_oversized_input() {
        assert!(MessageLog::validate("hi", None).is_ok());
        assert!(MessageLog::validate("  hi  ", Some("t-1")).is_ok());

        for bad in ["", "   ", "\n\t"] {
            assert!(matches!(
                MessageLog::validate(bad, None),
                Err(ChatError::InvalidArgument(_))
            ));
        }
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(MessageLog::validate(&long, None).is_err());
        assert!(MessageLog::validate("hi", Some("")).is_err());
        assert!(MessageLog::validate("hi", Some(&"t".repeat(65))).is_err());
    }
}
