pub mod auth;
pub mod chat;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod identities;
pub mod identity;
pub mod message_log;
pub mod messages;
pub mod middleware;
pub mod unread;

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::chat::ChatService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub verifier: TokenVerifier,
}
