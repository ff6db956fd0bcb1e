use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, IdentityId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub subject: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The fields of an identity that other participants are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: IdentityId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A one-to-one conversation. Participants are kept in canonical order,
/// smaller id first, so an unordered pair has exactly one representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [IdentityId; 2],
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Orders an unordered pair the way the directory stores it.
    pub fn canonical_pair(a: IdentityId, b: IdentityId) -> (IdentityId, IdentityId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    pub fn is_participant(&self, identity: IdentityId) -> bool {
        self.participants.contains(&identity)
    }

    /// The other participant, or `None` if `identity` is not in this conversation.
    pub fn peer_of(&self, identity: IdentityId) -> Option<IdentityId> {
        match self.participants {
            [a, b] if a == identity => Some(b),
            [a, b] if b == identity => Some(a),
            _ => None,
        }
    }
}

/// A conversation as seen from one participant: who the peer is and how
/// many messages are still unread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub peer: PublicProfile,
    pub unread: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub sender_id: IdentityId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Per-conversation ordering key assigned by the message log.
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub conversation_id: ConversationId,
    pub count: u64,
}
