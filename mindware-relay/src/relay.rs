//! Relay server core: shared state, HTTP routes, and the WebSocket handler.
//!
//! Each client connects to `/ws/{room_id}/{user_id}`. The path binds the
//! connection's identity for its whole lifetime; frames are then routed by
//! [`crate::router`] under the room's lock and delivered through each
//! connection's bounded outbound queue.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use mindware_proto::chat::validate_identifier;
use tokio::sync::{Notify, mpsc};

use crate::api;
use crate::config::{DEFAULT_HTTP_HISTORY_LIMIT, DEFAULT_OUTBOUND_QUEUE_CAPACITY, RelayConfig};
use crate::error::RelayError;
use crate::registry::ConnectionRegistry;
use crate::router::RouterConfig;
use crate::session::RelaySession;

/// Shared relay server state.
pub struct RelayState {
    /// Live connections, rooms and their history.
    pub registry: ConnectionRegistry,
    router: RouterConfig,
    outbound_queue_capacity: usize,
    http_history_limit: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            router: RouterConfig::default(),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            http_history_limit: DEFAULT_HTTP_HISTORY_LIMIT,
        }
    }

    /// Creates a relay state from a resolved [`RelayConfig`].
    #[must_use]
    pub fn with_config(config: &RelayConfig) -> Self {
        Self {
            registry: ConnectionRegistry::with_limits(config.history_capacity, config.max_idle_rooms),
            router: RouterConfig {
                max_payload_size: config.max_payload_size,
                plain_text_fallback: config.plain_text_fallback,
            },
            outbound_queue_capacity: config.outbound_queue_capacity.max(1),
            http_history_limit: config.http_history_limit,
        }
    }

    /// Limits applied to inbound frames.
    #[must_use]
    pub const fn router_config(&self) -> &RouterConfig {
        &self.router
    }

    /// Bound on each connection's outbound queue.
    #[must_use]
    pub const fn outbound_queue_capacity(&self) -> usize {
        self.outbound_queue_capacity
    }

    /// Messages returned by the HTTP history endpoint.
    #[must_use]
    pub const fn http_history_limit(&self) -> usize {
        self.http_history_limit
    }
}

/// Handles an upgraded WebSocket connection for one `(room, user)` pair.
///
/// The connection lifecycle:
/// 1. Register in the room; every member (including this one) receives the
///    new `user_list`.
/// 2. Spawn a writer task draining the outbound queue into the socket.
/// 3. Route inbound text frames until the client closes, the writer fails,
///    or the connection is evicted for falling behind.
/// 4. Unregister; the remaining members receive the new `user_list`.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, room: String, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(state.outbound_queue_capacity());
    let evict = Arc::new(Notify::new());

    let mut session = RelaySession::new(Arc::clone(&state));
    if let Err(e) = session.join(&room, &user_id, tx, Arc::clone(&evict)) {
        tracing::warn!(room = %room, user_id = %user_id, error = %e, "failed to register connection");
        return;
    }
    let conn_id = session
        .handle()
        .map(|handle| handle.conn_id().to_string())
        .unwrap_or_default();

    // Writer task: forwards queued messages to the WebSocket.
    let writer_conn_id = conn_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %writer_conn_id, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader = async {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => dispatch(&session, text.as_str()),
                Message::Close(_) => {
                    tracing::debug!(conn_id = %conn_id, "received close frame");
                    break;
                }
                Message::Binary(data) => {
                    tracing::warn!(conn_id = %conn_id, len = data.len(), "dropping binary frame");
                }
                _ => {
                    // Ping and pong are answered by the transport.
                }
            }
        }
    };

    tokio::select! {
        () = reader => {
            write_task.abort();
        }
        _ = &mut write_task => {}
        () = evict.notified() => {
            tracing::warn!(conn_id = %conn_id, room = %room, user_id = %user_id, "evicting slow connection");
            write_task.abort();
        }
    }

    session.close();
    tracing::info!(conn_id = %conn_id, room = %room, user_id = %user_id, "connection closed");
}

/// Routes one text frame and logs the outcome. Never ends the session.
fn dispatch(session: &RelaySession, raw: &str) {
    let Some(handle) = session.handle() else {
        return;
    };
    match session.handle_text(raw) {
        Ok(routed) => {
            tracing::trace!(conn_id = %handle.conn_id(), routed = ?routed, "frame routed");
        }
        Err(RelayError::MalformedMessage(reason)) => {
            tracing::warn!(
                conn_id = %handle.conn_id(),
                user_id = %handle.user_id(),
                reason = %reason,
                "dropping malformed frame"
            );
        }
        Err(e) => {
            tracing::debug!(conn_id = %handle.conn_id(), error = %e, "frame not fully delivered");
        }
    }
}

/// Builds the axum router with every relay route.
pub fn build_router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(api::health))
        .route("/ws/{room_id}/{user_id}", axum::routing::get(ws_handler))
        .route("/api/pseudonym", axum::routing::get(api::pseudonym))
        .route("/api/history/{room_id}", axum::routing::get(api::history))
        .with_state(state)
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::with_config`] to apply a resolved
/// [`crate::config::RelayConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that validates the path identity and upgrades to a
/// WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room_id, user_id)): Path<(String, String)>,
    State(state): State<Arc<RelayState>>,
) -> Response {
    if let Err(e) = validate_identifier(&room_id).and_then(|()| validate_identifier(&user_id)) {
        tracing::warn!(error = %e, "rejecting connection with invalid identity");
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, user_id))
}
