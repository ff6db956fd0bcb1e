use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;

use tandem_types::events::{GatewayEvent, PresenceStatus};
use tandem_types::ids::{ConnectionId, ConversationId, IdentityId};

pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Addresses one admitted connection. Bound to a single identity for the
/// lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub connection_id: ConnectionId,
    pub identity_id: IdentityId,
}

struct Session {
    tx: EventSender,
    joined: HashSet<ConversationId>,
}

/// What a connection gets back when it is admitted.
pub struct Admission {
    pub session: SessionHandle,
    /// Every event addressed to this session: personal-channel pushes,
    /// conversation-channel pushes and direct replies.
    pub events: EventReceiver,
    /// True if this is the identity's only live session.
    pub came_online: bool,
}

/// Live sessions and channel membership.
///
/// `identities` is the personal channel of every identity: all of its
/// sessions, keyed by connection. Every mutation goes through that identity's
/// map entry, so membership changes for one identity are serialized while
/// different identities proceed in parallel. `channels` is the reverse index
/// used for conversation-scoped fan-out. Lock order is always `identities`
/// then `channels`.
#[derive(Default)]
pub struct SessionRegistry {
    identities: DashMap<IdentityId, HashMap<ConnectionId, Session>>,
    channels: DashMap<ConversationId, HashMap<ConnectionId, EventSender>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new connection for `identity_id`. `announce` runs while the
    /// identity's entry is still locked, so online/offline transitions for
    /// one identity are announced in the order they happen.
    pub fn on_connect(
        &self,
        identity_id: IdentityId,
        announce: impl FnOnce(PresenceStatus),
    ) -> Admission {
        let connection_id = ConnectionId::new();
        let (tx, events) = mpsc::unbounded_channel();

        let mut sessions = self.identities.entry(identity_id).or_default();
        let came_online = sessions.is_empty();
        sessions.insert(
            connection_id,
            Session {
                tx,
                joined: HashSet::new(),
            },
        );
        if came_online {
            announce(PresenceStatus::Online);
        }

        Admission {
            session: SessionHandle {
                connection_id,
                identity_id,
            },
            events,
            came_online,
        }
    }

    /// Remove a closed connection and every channel membership it held.
    /// Returns true if it was the identity's last session.
    pub fn on_disconnect(
        &self,
        session: &SessionHandle,
        announce: impl FnOnce(PresenceStatus),
    ) -> bool {
        let Entry::Occupied(mut entry) = self.identities.entry(session.identity_id) else {
            return false;
        };
        let Some(removed) = entry.get_mut().remove(&session.connection_id) else {
            return false;
        };

        for conversation_id in removed.joined {
            self.remove_from_channel(conversation_id, session.connection_id);
        }

        if entry.get().is_empty() {
            entry.remove();
            announce(PresenceStatus::Offline);
            true
        } else {
            false
        }
    }

    /// Add the session to a conversation channel. Returns false if the
    /// session is already gone.
    pub fn join(&self, session: &SessionHandle, conversation_id: ConversationId) -> bool {
        let Some(mut sessions) = self.identities.get_mut(&session.identity_id) else {
            return false;
        };
        let Some(state) = sessions.get_mut(&session.connection_id) else {
            return false;
        };

        if state.joined.insert(conversation_id) {
            self.channels
                .entry(conversation_id)
                .or_default()
                .insert(session.connection_id, state.tx.clone());
        }
        true
    }

    /// Remove the session from a conversation channel. Returns whether it was
    /// a member.
    pub fn leave(&self, session: &SessionHandle, conversation_id: ConversationId) -> bool {
        let Some(mut sessions) = self.identities.get_mut(&session.identity_id) else {
            return false;
        };
        let Some(state) = sessions.get_mut(&session.connection_id) else {
            return false;
        };

        let was_member = state.joined.remove(&conversation_id);
        if was_member {
            self.remove_from_channel(conversation_id, session.connection_id);
        }
        was_member
    }

    pub fn is_joined(&self, session: &SessionHandle, conversation_id: ConversationId) -> bool {
        self.identities
            .get(&session.identity_id)
            .and_then(|sessions| {
                sessions
                    .get(&session.connection_id)
                    .map(|s| s.joined.contains(&conversation_id))
            })
            .unwrap_or(false)
    }

    /// Push to every live session of an identity. Returns how many accepted it.
    pub fn send_to_identity(&self, identity_id: IdentityId, event: &GatewayEvent) -> usize {
        self.identities.get(&identity_id).map_or(0, |sessions| {
            sessions
                .values()
                .filter(|s| s.tx.send(event.clone()).is_ok())
                .count()
        })
    }

    /// Push to every session that joined a conversation channel.
    pub fn send_to_channel(&self, conversation_id: ConversationId, event: &GatewayEvent) -> usize {
        self.channels.get(&conversation_id).map_or(0, |members| {
            members
                .values()
                .filter(|tx| tx.send(event.clone()).is_ok())
                .count()
        })
    }

    /// Push to one session only.
    pub fn send_to_session(&self, session: &SessionHandle, event: GatewayEvent) -> bool {
        self.identities
            .get(&session.identity_id)
            .and_then(|sessions| {
                sessions
                    .get(&session.connection_id)
                    .map(|s| s.tx.send(event).is_ok())
            })
            .unwrap_or(false)
    }

    pub fn is_online(&self, identity_id: IdentityId) -> bool {
        self.identities.contains_key(&identity_id)
    }

    pub fn session_count(&self, identity_id: IdentityId) -> usize {
        self.identities.get(&identity_id).map_or(0, |s| s.len())
    }

    pub fn online_identities(&self) -> Vec<IdentityId> {
        self.identities.iter().map(|entry| *entry.key()).collect()
    }

    fn remove_from_channel(&self, conversation_id: ConversationId, connection_id: ConnectionId) {
        if let Entry::Occupied(mut members) = self.channels.entry(conversation_id) {
            members.get_mut().remove(&connection_id);
            if members.get().is_empty() {
                members.remove();
            }
        }
    }
}
