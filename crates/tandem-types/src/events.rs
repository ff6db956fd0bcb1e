use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, ConversationId, IdentityId};
use crate::models::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingState {
    On,
    Off,
}

/// Events pushed FROM server TO client over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// The connection was admitted and bound to an identity
    Ready {
        identity_id: IdentityId,
        connection_id: ConnectionId,
    },

    /// A message was appended to a conversation the recipient takes part in
    NewMessage { message: Message },

    /// Badge update for the recipient of a new message
    Notification {
        conversation_id: ConversationId,
        sender_id: IdentityId,
        preview: String,
        /// `None` when the unread counter could not be updated
        unread: Option<u64>,
    },

    /// An identity came online (first session) or went offline (last session)
    Presence {
        identity_id: IdentityId,
        status: PresenceStatus,
    },

    Typing {
        conversation_id: ConversationId,
        identity_id: IdentityId,
        state: TypingState,
    },

    /// The peer acknowledged everything in the conversation as read
    ReadReceipt {
        conversation_id: ConversationId,
        reader_id: IdentityId,
        read_at: DateTime<Utc>,
    },

    Joined { conversation_id: ConversationId },

    Left { conversation_id: ConversationId },

    /// A command from this session was rejected
    Error { kind: String, message: String },
}

impl GatewayEvent {
    /// Stable name of the variant, as it appears in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage { .. } => "new_message",
            Self::Notification { .. } => "notification",
            Self::Presence { .. } => "presence",
            Self::Typing { .. } => "typing",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::Joined { .. } => "joined",
            Self::Left { .. } => "left",
            Self::Error { .. } => "error",
        }
    }
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Join a conversation channel. Only participants may join.
    Join { conversation_id: ConversationId },

    Leave { conversation_id: ConversationId },

    /// Toggle the typing indicator in a joined conversation
    Typing {
        conversation_id: ConversationId,
        state: TypingState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_snake_case_tags() {
        let event = GatewayEvent::Presence {
            identity_id: IdentityId(20),
            status: PresenceStatus::Offline,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "presence");
        assert_eq!(json["data"]["identity_id"], 20);
        assert_eq!(json["data"]["status"], "offline");
        assert_eq!(event.name(), "presence");
    }

    #[test]
    fn typing_command_parses_from_client_json() {
        let raw = r#"{"type":"typing","data":{"conversation_id":7,"state":"on"}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Typing {
                conversation_id: ConversationId(7),
                state: TypingState::On,
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let raw = r#"{"type":"voice_join","data":{"channel_id":1}}"#;
        assert!(serde_json::from_str::<GatewayCommand>(raw).is_err());
    }
}
