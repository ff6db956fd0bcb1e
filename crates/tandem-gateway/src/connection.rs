use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tandem_db::{Database, blocking};
use tandem_types::error::ChatError;
use tandem_types::events::{GatewayCommand, GatewayEvent, PresenceStatus};
use tandem_types::ids::{ConversationId, IdentityId};

use crate::dispatcher::{Dispatcher, Target};
use crate::registry::{EventReceiver, SessionHandle};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    /// Used to check conversation membership before a channel join.
    pub db: Arc<Database>,
}

/// Handle an authenticated WebSocket connection.
///
/// The credential was verified and resolved to `identity_id` at the HTTP
/// upgrade, so a connection that reaches this point is already bound to its
/// identity.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext, identity_id: IdentityId) {
    let (mut sender, receiver) = socket.split();

    // Subscribe before admission so our own "online" is not missed
    let broadcast_rx = ctx.dispatcher.subscribe();
    let admission = ctx.dispatcher.connect(identity_id);
    let session = admission.session;

    info!(
        "Identity {} connected to gateway (connection {})",
        identity_id, session.connection_id
    );

    let ready = GatewayEvent::Ready {
        identity_id,
        connection_id: session.connection_id,
    };
    let mut greeted = send_event(&mut sender, &ready).await;

    // Let the new client see who is already here
    for other in ctx.dispatcher.registry().online_identities() {
        if !greeted {
            break;
        }
        if other == identity_id {
            continue;
        }
        let event = GatewayEvent::Presence {
            identity_id: other,
            status: PresenceStatus::Online,
        };
        greeted = send_event(&mut sender, &event).await;
    }

    if greeted {
        run_connection_loop(sender, receiver, ctx.clone(), session, admission.events, broadcast_rx)
            .await;
    }

    ctx.dispatcher.disconnect(&session);
    info!(
        "Identity {} disconnected from gateway (connection {})",
        identity_id, session.connection_id
    );
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    session: SessionHandle,
    mut session_rx: EventReceiver,
    mut broadcast_rx: broadcast::Receiver<GatewayEvent>,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + session events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = session_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&ctx, &session, cmd).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!(
                            "Identity {} bad command: {} -- raw: {}",
                            session.identity_id, e, raw
                        );
                        reject(&ctx.dispatcher, &session, ChatError::InvalidArgument(e.to_string()));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn handle_command(ctx: &GatewayContext, session: &SessionHandle, cmd: GatewayCommand) {
    let registry = ctx.dispatcher.registry();

    match cmd {
        GatewayCommand::Join { conversation_id } => {
            if let Err(e) = authorize_join(ctx, session.identity_id, conversation_id).await {
                debug!(
                    "Identity {} may not join conversation {}: {}",
                    session.identity_id, conversation_id, e
                );
                reject(&ctx.dispatcher, session, e);
                return;
            }
            if registry.join(session, conversation_id) {
                ctx.dispatcher
                    .reply(session, GatewayEvent::Joined { conversation_id });
            }
        }

        GatewayCommand::Leave { conversation_id } => {
            registry.leave(session, conversation_id);
            ctx.dispatcher
                .reply(session, GatewayEvent::Left { conversation_id });
        }

        GatewayCommand::Typing {
            conversation_id,
            state,
        } => {
            if !registry.is_joined(session, conversation_id) {
                reject(&ctx.dispatcher, session, ChatError::Forbidden);
                return;
            }
            ctx.dispatcher.dispatch(
                GatewayEvent::Typing {
                    conversation_id,
                    identity_id: session.identity_id,
                    state,
                },
                Target::Conversation(conversation_id),
            );
        }
    }
}

/// Only participants may join a conversation channel.
async fn authorize_join(
    ctx: &GatewayContext,
    identity_id: IdentityId,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    let conversation = blocking(&ctx.db, move |db| db.conversation_by_id(conversation_id))
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation {}", conversation_id)))?;

    if conversation.is_participant(identity_id) {
        Ok(())
    } else {
        Err(ChatError::Forbidden)
    }
}

fn reject(dispatcher: &Dispatcher, session: &SessionHandle, error: ChatError) {
    dispatcher.reply(
        session,
        GatewayEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        },
    );
}

/// Serialize and send one event. Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.name(), e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
