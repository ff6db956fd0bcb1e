use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use tandem_types::events::{GatewayEvent, PresenceStatus};
use tandem_types::ids::{ConversationId, IdentityId};

use crate::registry::{Admission, SessionHandle, SessionRegistry};

/// Where an event should be fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every live session of one identity (multi-device).
    Identity(IdentityId),
    /// Every session that joined a conversation channel.
    Conversation(ConversationId),
    /// Every connected client.
    Everyone,
}

/// Routes gateway events to live sessions. Delivery is best effort: an event
/// with nobody listening is dropped without error. Never touches storage.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: SessionRegistry,

    /// Fan-out for `Target::Everyone`; each connection loop holds a receiver
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                registry: SessionRegistry::new(),
                broadcast_tx,
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Subscribe to events addressed to everyone.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Push `event` to every live session under `target`. Returns how many
    /// sessions accepted it; zero is a normal outcome.
    pub fn dispatch(&self, event: GatewayEvent, target: Target) -> usize {
        if !routable(&event, target) {
            warn!("Refusing to route {} to {:?}", event.name(), target);
            return 0;
        }

        let delivered = match target {
            Target::Identity(identity_id) => self.inner.registry.send_to_identity(identity_id, &event),
            Target::Conversation(conversation_id) => {
                self.inner.registry.send_to_channel(conversation_id, &event)
            }
            Target::Everyone => self.inner.broadcast_tx.send(event.clone()).unwrap_or(0),
        };

        trace!("{} -> {:?}: {} session(s)", event.name(), target, delivered);
        delivered
    }

    /// Answer one session directly (acks and command errors).
    pub fn reply(&self, session: &SessionHandle, event: GatewayEvent) -> bool {
        self.inner.registry.send_to_session(session, event)
    }

    /// Admit a connection and announce the identity if it just came online.
    pub fn connect(&self, identity_id: IdentityId) -> Admission {
        let admission = self
            .inner
            .registry
            .on_connect(identity_id, |status| self.announce(identity_id, status));
        debug!(
            "Session {} admitted for identity {} ({} live)",
            admission.session.connection_id,
            identity_id,
            self.inner.registry.session_count(identity_id)
        );
        admission
    }

    /// Drop a closed connection; announces offline after the last one.
    pub fn disconnect(&self, session: &SessionHandle) {
        let identity_id = session.identity_id;
        self.inner
            .registry
            .on_disconnect(session, |status| self.announce(identity_id, status));
    }

    fn announce(&self, identity_id: IdentityId, status: PresenceStatus) {
        self.dispatch(GatewayEvent::Presence { identity_id, status }, Target::Everyone);
    }
}

/// Which targets each event kind may be fanned out to. Session-local events
/// (`ready`, acks, errors) only ever go through `Dispatcher::reply`.
fn routable(event: &GatewayEvent, target: Target) -> bool {
    match event {
        GatewayEvent::NewMessage { .. }
        | GatewayEvent::Notification { .. }
        | GatewayEvent::ReadReceipt { .. } => matches!(target, Target::Identity(_)),
        GatewayEvent::Typing {
            conversation_id, ..
        } => target == Target::Conversation(*conversation_id),
        GatewayEvent::Presence { .. } => target == Target::Everyone,
        GatewayEvent::Ready { .. }
        | GatewayEvent::Joined { .. }
        | GatewayEvent::Left { .. }
        | GatewayEvent::Error { .. } => false,
    }
}
