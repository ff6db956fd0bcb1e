//! Row types as they come out of SQLite. Timestamps are stored as Unix
//! milliseconds; conversion to the shared models happens here so callers
//! never see raw rows.

use chrono::{DateTime, Utc};

use tandem_types::ids::{ConversationId, IdentityId};
use tandem_types::models::{Conversation, Identity, Message, PublicProfile, UnreadCount};

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub struct IdentityRow {
    pub id: i64,
    pub subject: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
}

impl IdentityRow {
    pub fn into_model(self) -> Identity {
        Identity {
            id: IdentityId(self.id),
            subject: self.subject,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            created_at: millis_to_utc(self.created_at),
        }
    }
}

pub struct ConversationRow {
    pub id: i64,
    pub user_low: i64,
    pub user_high: i64,
    pub created_at: i64,
}

impl ConversationRow {
    pub fn into_model(self) -> Conversation {
        Conversation {
            id: ConversationId(self.id),
            participants: [IdentityId(self.user_low), IdentityId(self.user_high)],
            created_at: millis_to_utc(self.created_at),
        }
    }
}

/// A conversation joined with the public profile of the other participant.
pub struct PeerConversationRow {
    pub conversation: ConversationRow,
    pub peer_id: i64,
    pub peer_display_name: String,
    pub peer_avatar_url: Option<String>,
}

impl PeerConversationRow {
    pub fn into_parts(self) -> (Conversation, PublicProfile) {
        let peer = PublicProfile {
            id: IdentityId(self.peer_id),
            display_name: self.peer_display_name,
            avatar_url: self.peer_avatar_url,
        };
        (self.conversation.into_model(), peer)
    }
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub seq: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: i64,
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        Message {
            id: self.id,
            conversation_id: ConversationId(self.conversation_id),
            sender_id: IdentityId(self.sender_id),
            text: self.body,
            created_at: millis_to_utc(self.created_at),
            seq: self.seq,
        }
    }
}

pub struct UnreadRow {
    pub conversation_id: i64,
    pub count: i64,
}

impl UnreadRow {
    pub fn into_model(self) -> UnreadCount {
        UnreadCount {
            conversation_id: ConversationId(self.conversation_id),
            count: self.count.max(0) as u64,
        }
    }
}
