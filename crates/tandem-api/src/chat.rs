use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use tandem_db::log::Appended;
use tandem_db::{Database, LogStore};
use tandem_gateway::dispatcher::{Dispatcher, Target};
use tandem_types::api::{RegisterIdentityRequest, SendMessageRequest};
use tandem_types::error::ChatError;
use tandem_types::events::GatewayEvent;
use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::{Conversation, ConversationSummary, Identity, Message, UnreadCount};

use crate::directory::ConversationDirectory;
use crate::identity::IdentityResolver;
use crate::message_log::MessageLog;
use crate::unread::UnreadLedger;

const PREVIEW_CHARS: usize = 80;

/// Orchestrates the chat pipeline on top of the store-backed components and
/// the realtime dispatcher. HTTP handlers and tests both go through here.
#[derive(Clone)]
pub struct ChatService {
    identities: IdentityResolver,
    directory: ConversationDirectory,
    log: MessageLog,
    unread: UnreadLedger,
    dispatcher: Dispatcher,
}

impl ChatService {
    pub fn new(db: Arc<Database>, log: Arc<LogStore>, dispatcher: Dispatcher) -> Self {
        Self {
            identities: IdentityResolver::new(db.clone()),
            directory: ConversationDirectory::new(db),
            log: MessageLog::new(log.clone()),
            unread: UnreadLedger::new(log),
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // -- Identities --

    pub async fn resolve(&self, subject: &str) -> Result<IdentityId, ChatError> {
        self.identities.resolve(subject).await
    }

    pub async fn register(
        &self,
        subject: &str,
        req: RegisterIdentityRequest,
    ) -> Result<(Identity, bool), ChatError> {
        self.identities.register(subject, req).await
    }

    pub async fn me(&self, subject: &str) -> Result<Identity, ChatError> {
        self.identities.identity(subject).await
    }

    // -- Conversations --

    pub async fn open_conversation(
        &self,
        subject: &str,
        peer_subject: &str,
    ) -> Result<Conversation, ChatError> {
        let me = self.identities.resolve(subject).await?;
        let peer = self.identities.resolve(peer_subject).await?;
        self.directory.find_or_create(me, peer).await
    }

    pub async fn conversation(
        &self,
        subject: &str,
        id: ConversationId,
    ) -> Result<Conversation, ChatError> {
        let me = self.identities.resolve(subject).await?;
        self.directory.get(id, me).await
    }

    /// The caller's conversations with peer profiles and unread counts.
    /// The two stores are read separately; no cross-store snapshot.
    pub async fn conversations(&self, subject: &str) -> Result<Vec<ConversationSummary>, ChatError> {
        let me = self.identities.resolve(subject).await?;
        let listed = self.directory.list_for(me).await?;
        let counts: HashMap<ConversationId, u64> = self
            .unread
            .all_for(me)
            .await?
            .into_iter()
            .map(|c| (c.conversation_id, c.count))
            .collect();

        Ok(listed
            .into_iter()
            .map(|(conversation, peer)| ConversationSummary {
                id: conversation.id,
                created_at: conversation.created_at,
                unread: counts.get(&conversation.id).copied().unwrap_or(0),
                peer,
            })
            .collect())
    }

    pub async fn history(
        &self,
        subject: &str,
        id: ConversationId,
        after_seq: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ChatError> {
        let me = self.identities.resolve(subject).await?;
        let conversation = self.directory.get(id, me).await?;
        self.log.list(conversation.id, after_seq, limit).await
    }

    // -- Messages --

    /// Persist a message and fan it out.
    ///
    /// Validation runs before anything touches storage. The pipeline itself
    /// runs on its own task so a caller that goes away mid-request cannot
    /// cancel an append half way through.
    pub async fn send(&self, subject: &str, req: SendMessageRequest) -> Result<Appended, ChatError> {
        MessageLog::validate(&req.text, req.client_token.as_deref())?;
        if req.receiver_subject.trim().is_empty() {
            return Err(ChatError::InvalidArgument("receiver_subject is empty".into()));
        }

        let service = self.clone();
        let sender_subject = subject.to_string();
        tokio::spawn(async move { service.deliver(&sender_subject, req).await })
            .await
            .map_err(|e| ChatError::Internal(format!("send task failed: {}", e)))?
    }

    async fn deliver(&self, subject: &str, req: SendMessageRequest) -> Result<Appended, ChatError> {
        let sender = self.identities.resolve(subject).await?;
        let receiver = self.identities.resolve(&req.receiver_subject).await?;
        let conversation = self.directory.find_or_create(sender, receiver).await?;

        let appended = self
            .log
            .append(conversation.id, sender, req.text, req.client_token)
            .await?;
        if !appended.created {
            debug!(
                "Duplicate send in conversation {} resolved to seq {}",
                conversation.id, appended.message.seq
            );
            return Ok(appended);
        }

        // The message is durable from here on; a counter failure must not
        // turn the send into an error.
        let unread = match self.unread.increment_on_send(receiver, conversation.id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(
                    "Unread increment failed for {} in conversation {}: {}",
                    receiver, conversation.id, e
                );
                None
            }
        };

        let message = appended.message.clone();
        let new_message = GatewayEvent::NewMessage {
            message: message.clone(),
        };
        let live = self
            .dispatcher
            .dispatch(new_message.clone(), Target::Identity(receiver));
        self.dispatcher.dispatch(new_message, Target::Identity(sender));
        self.dispatcher.dispatch(
            GatewayEvent::Notification {
                conversation_id: conversation.id,
                sender_id: sender,
                preview: message.text.chars().take(PREVIEW_CHARS).collect(),
                unread,
            },
            Target::Identity(receiver),
        );

        debug!(
            "Message seq {} in conversation {} reached {} receiver session(s)",
            message.seq, conversation.id, live
        );
        Ok(appended)
    }

    // -- Unread --

    /// Mark a conversation read for the caller and tell the peer. Returns
    /// the counter as left by the reset; a send racing in afterwards is
    /// counted against the next read.
    pub async fn mark_read(&self, subject: &str, id: ConversationId) -> Result<u64, ChatError> {
        let me = self.identities.resolve(subject).await?;
        let conversation = self.directory.get(id, me).await?;
        self.unread.reset(me, conversation.id).await?;

        if let Some(peer) = conversation.peer_of(me) {
            self.dispatcher.dispatch(
                GatewayEvent::ReadReceipt {
                    conversation_id: conversation.id,
                    reader_id: me,
                    read_at: Utc::now(),
                },
                Target::Identity(peer),
            );
        }
        Ok(0)
    }

    pub async fn unread(&self, subject: &str) -> Result<Vec<UnreadCount>, ChatError> {
        let me = self.identities.resolve(subject).await?;
        self.unread.all_for(me).await
    }
}
