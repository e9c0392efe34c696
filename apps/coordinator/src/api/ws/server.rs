//! WebSocket server message handling - sends messages to clients

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};

use crate::config::WsConfig;
use crate::rooms::broadcast::Inbound;

/// Drain the connection's outbound queue to the socket and keep the transport alive
pub(super) async fn handle_server_messages(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut inbound: Inbound,
    last_pong: Arc<RwLock<Instant>>,
    ws_config: WsConfig,
) {
    let pong_timeout = ws_config.pong_timeout();
    let mut ping_interval = interval(ws_config.ping_interval());

    loop {
        tokio::select! {
            // Send ping and check for a dead transport
            _ = ping_interval.tick() => {
                let pong_elapsed = last_pong.read().await.elapsed();
                if pong_elapsed > pong_timeout {
                    log::warn!("No pong received for {:?}, disconnecting client", pong_elapsed);
                    break;
                }

                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    log::error!("Failed to send ping, client disconnected");
                    break;
                }
                log::debug!("Sent ping to client");
            }

            // Forward room events and direct replies
            message = inbound.recv() => {
                let Some(message) = message else {
                    break;
                };
                match serde_json::to_string(&*message) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            log::error!("Failed to send message to client");
                            break;
                        }
                    }
                    Err(e) => log::error!("Failed to serialize {:?}: {}", message, e),
                }
            }
        }
    }

    let _ = sender.close().await;
}
