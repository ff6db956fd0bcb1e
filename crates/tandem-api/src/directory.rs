use std::sync::Arc;

use tracing::info;

use tandem_db::{Database, blocking};
use tandem_types::error::ChatError;
use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::{Conversation, PublicProfile};

/// The canonical registry of one-to-one conversations.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: Arc<Database>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The conversation between `a` and `b`, created on first contact.
    /// Concurrent calls for the same pair all observe the same id.
    pub async fn find_or_create(
        &self,
        a: IdentityId,
        b: IdentityId,
    ) -> Result<Conversation, ChatError> {
        if a == b {
            return Err(ChatError::InvalidArgument(
                "a conversation needs two distinct participants".into(),
            ));
        }

        let (conversation, created) =
            blocking(&self.db, move |db| db.find_or_create_conversation(a, b)).await?;
        if created {
            info!("Conversation {} created between {} and {}", conversation.id, a, b);
        }
        Ok(conversation)
    }

    /// Fetch a conversation on behalf of `requester`, who must take part in it.
    pub async fn get(
        &self,
        id: ConversationId,
        requester: IdentityId,
    ) -> Result<Conversation, ChatError> {
        let conversation = blocking(&self.db, move |db| db.conversation_by_id(id))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {}", id)))?;

        if !conversation.is_participant(requester) {
            return Err(ChatError::Forbidden);
        }
        Ok(conversation)
    }

    /// Conversations of `identity`, newest first, with the peer's profile.
    pub async fn list_for(
        &self,
        identity: IdentityId,
    ) -> Result<Vec<(Conversation, PublicProfile)>, ChatError> {
        Ok(blocking(&self.db, move |db| db.conversations_for(identity)).await?)
    }
}
