//! WebSocket client message handling - receives messages from clients

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::errors::CoordinatorError;
use crate::models::api::{ClientMessage, ServerMessage};
use crate::models::domain::AuctionResult;
use crate::rooms::ConnectionGuard;

/// Read frames until the client goes away. Faults are reported back to the
/// client and never end the loop.
pub(super) async fn handle_client_messages(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    guard: &ConnectionGuard,
    last_pong: &RwLock<Instant>,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(guard, text.as_str()).await,
            Ok(Message::Pong(_)) => {
                *last_pong.write().await = Instant::now();
                log::debug!("Received pong from {}", guard.id());
            }
            Ok(Message::Close(_)) => {
                log::debug!("Client {} sent close frame", guard.id());
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("WebSocket error on {}: {}", guard.id(), e);
                break;
            }
        }
    }
}

async fn handle_text(guard: &ConnectionGuard, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            log::debug!("Unparseable message from {}: {}", guard.id(), e);
            let reply = if raw_type(text).as_deref() == Some("placeBid") {
                ServerMessage::BidError {
                    message: "Invalid bid data".to_string(),
                }
            } else {
                ServerMessage::Error {
                    message: "Invalid message format".to_string(),
                }
            };
            guard.reply(reply);
            return;
        }
    };

    let rooms = guard.manager();
    let id = guard.id();

    match message {
        ClientMessage::JoinAuction { auction_id } => {
            if let Err(e) = rooms.join(id, &auction_id).await {
                report(guard, e);
            }
        }
        ClientMessage::LeaveAuction { auction_id } => {
            if let Err(e) = rooms.leave(id, &auction_id).await {
                report(guard, e);
            }
        }
        ClientMessage::CheckWatching { auction_id } => {
            let count = rooms.watcher_count(&auction_id).await;
            guard.reply(ServerMessage::Watching { auction_id, count });
        }
        ClientMessage::PlaceBid {
            auction_id,
            bid_amount,
            bid_time,
        } => {
            if let Err(e) = rooms.place_bid(id, &auction_id, bid_amount, bid_time).await {
                match e {
                    CoordinatorError::Validation { .. } | CoordinatorError::AuctionClosed { .. } => {
                        guard.reply(ServerMessage::BidError {
                            message: e.to_string(),
                        });
                    }
                    other => report(guard, other),
                }
            }
        }
        ClientMessage::Typing {
            auction_id,
            is_typing,
        } => {
            if let Err(e) = rooms.typing(id, &auction_id, is_typing).await {
                report(guard, e);
            }
        }
        ClientMessage::EndAuction {
            auction_id,
            winner,
            final_price,
            end_date,
        } => {
            if !guard.identity().privileged {
                log::warn!(
                    "User {} tried to end auction {} without privilege",
                    guard.identity().user_id,
                    auction_id
                );
                report(
                    guard,
                    CoordinatorError::Forbidden {
                        action: "endAuction".to_string(),
                    },
                );
                return;
            }

            let result = AuctionResult {
                auction_id,
                winner,
                final_price,
                end_date: end_date.unwrap_or_else(Utc::now),
            };
            if let Err(e) = rooms.end_auction(result).await {
                report(guard, e);
            }
        }
        ClientMessage::Ping => {
            guard.reply(ServerMessage::Pong);
        }
    }
}

fn report(guard: &ConnectionGuard, error: CoordinatorError) {
    log::debug!("Request from {} failed: {}", guard.id(), error);
    guard.reply(ServerMessage::Error {
        message: error.to_string(),
    });
}

/// The `type` tag of a frame that failed to parse as a whole
fn raw_type(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}
