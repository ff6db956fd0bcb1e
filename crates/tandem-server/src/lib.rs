pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, Request, State,
        rejection::QueryRejection,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, debug};

use tandem_api::auth::TokenVerifier;
use tandem_api::chat::ChatService;
use tandem_api::error::ApiError;
use tandem_api::middleware::{bearer_token, require_auth};
use tandem_api::{AppState, AppStateInner, conversations, identities, messages};
use tandem_db::{Database, LogStore};
use tandem_gateway::connection::{self, GatewayContext};
use tandem_gateway::dispatcher::Dispatcher;
use tandem_types::error::ChatError;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    gateway: GatewayContext,
}

/// Wire both stores, the dispatcher and the HTTP/WebSocket surface together.
pub fn build_router(db: Arc<Database>, log: Arc<LogStore>, verifier: TokenVerifier) -> Router {
    let dispatcher = Dispatcher::new();
    let chat = ChatService::new(db.clone(), log, dispatcher.clone());
    let app_state: AppState = Arc::new(AppStateInner { chat, verifier });

    let state = ServerState {
        app: app_state.clone(),
        gateway: GatewayContext { dispatcher, db },
    };

    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/identities", post(identities::register))
        .route("/identities/me", get(identities::me))
        .route(
            "/conversations",
            post(conversations::open_conversation).get(conversations::list_conversations),
        )
        .route("/conversations/{id}", get(conversations::get_conversation))
        .route("/conversations/{id}/messages", get(conversations::get_messages))
        .route("/conversations/{id}/read", post(conversations::mark_read))
        .route("/messages", post(messages::send_message))
        .route("/unread", get(conversations::unread))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Request span with the path only. The query string can carry a gateway
/// token and must never reach the logs.
fn request_span(request: &Request) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Authenticate before upgrading. Browsers cannot set headers on a
/// WebSocket handshake, so `?token=` is accepted as well.
async fn ws_upgrade(
    State(state): State<ServerState>,
    query: Result<Query<GatewayQuery>, QueryRejection>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| ChatError::Auth("missing token".into()))?;
    let subject = state.app.verifier.verify(&token)?;
    let identity_id = state.app.chat.resolve(&subject).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    debug!("Upgrading gateway connection for identity {}", identity_id);
    let ctx = state.gateway.clone();
    Ok(ws
        .on_upgrade(move |socket| connection::handle_connection(socket, ctx, identity_id))
        .into_response())
}
