use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// IDENTIFIERS
// ============================================================================

pub type AuctionId = String;
pub type UserId = String;

/// Unique id of one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Open,
    Ended,
}

/// Winner of an ended auction, either a bare user id or a user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Winner {
    Id(UserId),
    User(Bidder),
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// Identity attached to an admitted connection. Never changes after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    /// May end auctions over the socket
    #[serde(default)]
    pub privileged: bool,
}

/// Live connection as seen by the coordinator
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Arc<Identity>,
    pub authenticated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bidder {
    #[serde(alias = "_id")]
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BidEvent {
    pub auction_id: AuctionId,
    pub bidder: Bidder,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Final outcome of an auction, as decided by the authoritative service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionResult {
    pub auction_id: AuctionId,
    pub winner: Winner,
    pub final_price: f64,
    pub end_date: DateTime<Utc>,
}

/// Aggregate price state of an auction. Unknown fields are relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionUpdate {
    pub auction_id: AuctionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_bidder: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&BidEvent> for AuctionUpdate {
    fn from(bid: &BidEvent) -> Self {
        Self {
            auction_id: bid.auction_id.clone(),
            current_price: Some(bid.amount),
            last_bidder: Some(bid.bidder.name.clone()),
            timestamp: bid.timestamp,
            extra: Map::new(),
        }
    }
}
