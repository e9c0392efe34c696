use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::domain::{AuctionId, AuctionUpdate, Bidder, UserId, Winner};

// ============================================================================
// REST API TYPES
// ============================================================================

#[derive(Serialize, ToSchema)]
pub struct ApiResponse {
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Distinct users with at least one open connection
    pub connected_user_count: usize,
    pub connection_count: usize,
    /// Rooms with at least one member
    pub active_auction_count: usize,
    pub uptime_seconds: u64,
}

// ============================================================================
// NOTIFY API TYPES
// ============================================================================

/// Event relay request from the authoritative auction service
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotifyResponse {
    pub message: String,
}

/// `data` of a relayed `newBid`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBidNotice {
    pub auction_id: AuctionId,
    pub bid_data: BidData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidData {
    pub bid_amount: f64,
    pub bidder: Bidder,
    #[serde(default)]
    pub bid_time: Option<DateTime<Utc>>,
}

// ============================================================================
// WEBSOCKET MESSAGE TYPES (Client → Server)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinAuction {
        auction_id: AuctionId,
    },
    LeaveAuction {
        auction_id: AuctionId,
    },
    CheckWatching {
        auction_id: AuctionId,
    },
    PlaceBid {
        auction_id: AuctionId,
        bid_amount: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bid_time: Option<DateTime<Utc>>,
    },
    Typing {
        auction_id: AuctionId,
        is_typing: bool,
    },
    EndAuction {
        auction_id: AuctionId,
        winner: Winner,
        final_price: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<DateTime<Utc>>,
    },
    Ping,
}

// ============================================================================
// WEBSOCKET MESSAGE TYPES (Server → Client)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    // Presence
    UserJoined {
        auction_id: AuctionId,
        user_id: UserId,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        auction_id: AuctionId,
        user_id: UserId,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
    WatcherCount {
        auction_id: AuctionId,
        count: usize,
    },
    /// Direct reply to `checkWatching`
    Watching {
        auction_id: AuctionId,
        count: usize,
    },
    UserTyping {
        auction_id: AuctionId,
        user_id: UserId,
        user_name: String,
        is_typing: bool,
    },

    // Bids and lifecycle
    NewBid {
        auction_id: AuctionId,
        bid_amount: f64,
        bidder: Bidder,
        bid_time: DateTime<Utc>,
    },
    AuctionUpdate(AuctionUpdate),
    AuctionEnded {
        auction_id: AuctionId,
        winner: Winner,
        final_price: f64,
        end_date: DateTime<Utc>,
    },

    // Errors and connection management
    BidError {
        message: String,
    },
    Error {
        message: String,
    },
    Pong,
}
