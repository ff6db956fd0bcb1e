use std::sync::Arc;

use tandem_db::{LogStore, blocking};
use tandem_types::error::ChatError;
use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::UnreadCount;

/// Per-(recipient, conversation) unread counters. Both mutations are single
/// atomic statements in the log store.
#[derive(Clone)]
pub struct UnreadLedger {
    store: Arc<LogStore>,
}

impl UnreadLedger {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Returns the counter after the increment.
    pub async fn increment_on_send(
        &self,
        recipient: IdentityId,
        conversation_id: ConversationId,
    ) -> Result<u64, ChatError> {
        Ok(blocking(&self.store, move |log| log.increment_unread(recipient, conversation_id)).await?)
    }

    pub async fn reset(
        &self,
        user: IdentityId,
        conversation_id: ConversationId,
    ) -> Result<(), ChatError> {
        Ok(blocking(&self.store, move |log| log.reset_unread(user, conversation_id)).await?)
    }

    pub async fn all_for(&self, user: IdentityId) -> Result<Vec<UnreadCount>, ChatError> {
        Ok(blocking(&self.store, move |log| log.unread_for(user)).await?)
    }
}
