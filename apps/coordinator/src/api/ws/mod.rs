mod client;
mod server;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::models::domain::Identity;
use crate::AppState;
use client::handle_client_messages;
use server::handle_server_messages;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Create WebSocket routes
pub fn create_ws() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
///
/// The session credential is checked before the upgrade; a rejected
/// handshake gets a 401 and no connection is ever registered.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    match state
        .authenticator
        .authenticate(&headers, params.token.as_deref())
        .await
    {
        Ok(identity) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity)),
        Err(e) => {
            log::info!("Rejected WebSocket handshake: {}", e);
            e.into_response()
        }
    }
}

/// Handle an admitted WebSocket connection with ping/pong keepalive
async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (guard, inbound) = state.rooms.register(identity).await;
    let (sender, receiver) = socket.split();
    let last_pong = Arc::new(RwLock::new(Instant::now()));

    // Writer: outbound queue + ping/pong management
    let mut send_task = {
        let last_pong = last_pong.clone();
        let ws_config = state.ws.clone();

        tokio::spawn(async move {
            handle_server_messages(sender, inbound, last_pong, ws_config).await
        })
    };

    // Reader runs here so it can borrow the guard
    tokio::select! {
        _ = handle_client_messages(receiver, &guard, &last_pong) => {
            log::debug!("WebSocket receive loop ended for {}", guard.id());
        },
        _ = &mut send_task => {
            log::debug!("WebSocket send task ended for {}", guard.id());
        },
    }

    send_task.abort();
    let connection_id = guard.id();
    guard.close().await;

    log::info!("WebSocket connection {} closed", connection_id);
}
