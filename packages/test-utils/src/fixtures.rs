use anyhow::Context;
use chrono::{Duration, Utc};
use coordinator::auth::SessionClaims;
use coordinator::config::Config;
use coordinator::models::api::{ClientMessage, ServerMessage};
use coordinator::models::domain::Identity;
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use tokio_tungstenite::tungstenite::Message;

pub const TEST_SECRET: &str = "test-secret";

pub const ALICE: &str = "u-alice";
pub const BOB: &str = "u-bob";
pub const CAROL: &str = "u-carol";
pub const OPS: &str = "u-ops";

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Users known to the test identity directory. `u-ops` may end auctions.
pub fn test_identities() -> Vec<Identity> {
    vec![
        identity(ALICE, "Alice"),
        identity(BOB, "Bob"),
        identity(CAROL, "Carol"),
        Identity {
            user_id: OPS.to_string(),
            display_name: "Auction Ops".to_string(),
            privileged: true,
        },
    ]
}

pub fn identity(user_id: &str, display_name: &str) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        display_name: display_name.to_string(),
        privileged: false,
    }
}

/// Config with the test secret, a static directory and a fast heartbeat
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.identity.users = test_identities();
    config.ws.ping_interval_secs = 5;
    config.ws.pong_timeout_secs = 15;
    config
}

/// Sign a session token for `user_id`, valid for an hour
pub fn mint_token(user_id: &str) -> anyhow::Result<String> {
    mint_token_expiring(user_id, Utc::now() + Duration::hours(1))
}

pub fn mint_token_expiring(
    user_id: &str,
    expires_at: chrono::DateTime<Utc>,
) -> anyhow::Result<String> {
    let claims = SessionClaims {
        id: Some(user_id.to_string()),
        sub: None,
        exp: expires_at.timestamp().max(0) as u64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .context("Failed to sign test token")
}

/// Send a client message as a JSON text frame
pub async fn send_message(ws: &mut WsStream, message: &ClientMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    ws.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Wait for the next server message, skipping transport frames
pub async fn next_message(ws: &mut WsStream) -> anyhow::Result<ServerMessage> {
    let wait = tokio::time::Duration::from_secs(2);
    loop {
        let frame = tokio::time::timeout(wait, ws.next())
            .await
            .context("Timed out waiting for a server message")?
            .context("WebSocket closed")??;
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).context("Unexpected server message");
        }
    }
}

/// Assert that nothing arrives within a short window
pub async fn expect_silence(ws: &mut WsStream) -> anyhow::Result<()> {
    let wait = tokio::time::Duration::from_millis(200);
    loop {
        match tokio::time::timeout(wait, ws.next()).await {
            Err(_) => return Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => anyhow::bail!("Unexpected message: {}", text.as_str()),
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Ok(()),
        }
    }
}

/// Join an auction and return the watcher count the joiner then sees
///
/// Follows the join with `checkWatching`, so it also settles for tabs whose
/// join leaves the count unchanged and broadcasts nothing.
pub async fn join_auction(ws: &mut WsStream, auction_id: &str) -> anyhow::Result<usize> {
    for message in [
        ClientMessage::JoinAuction {
            auction_id: auction_id.to_string(),
        },
        ClientMessage::CheckWatching {
            auction_id: auction_id.to_string(),
        },
    ] {
        send_message(ws, &message).await?;
    }

    loop {
        match next_message(ws).await? {
            ServerMessage::Watching {
                auction_id: watched,
                count,
            } if watched == auction_id => return Ok(count),
            ServerMessage::Error { message } => anyhow::bail!("Join rejected: {}", message),
            _ => continue,
        }
    }
}
