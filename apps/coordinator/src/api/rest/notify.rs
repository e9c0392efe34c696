use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Json,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{CoordinatorError, Result};
use crate::models::api::{NewBidNotice, NotifyRequest, NotifyResponse};
use crate::models::domain::{AuctionResult, AuctionUpdate, BidEvent};
use crate::AppState;

pub const NOTIFY_SECRET_HEADER: &str = "x-notify-secret";

/// A validated event from the authoritative auction service
#[derive(Debug, Clone)]
pub enum NotifyEvent {
    NewBid(BidEvent),
    AuctionUpdate(AuctionUpdate),
    AuctionEnded(AuctionResult),
}

impl NotifyEvent {
    pub fn parse(event_type: &str, data: Value) -> Result<Self> {
        match event_type {
            "newBid" => {
                let notice: NewBidNotice = decode(event_type, data)?;
                Ok(NotifyEvent::NewBid(BidEvent {
                    auction_id: notice.auction_id,
                    bidder: notice.bid_data.bidder,
                    amount: notice.bid_data.bid_amount,
                    timestamp: notice.bid_data.bid_time.unwrap_or_else(Utc::now),
                }))
            }
            "auctionUpdate" => Ok(NotifyEvent::AuctionUpdate(decode(event_type, data)?)),
            "auctionEnded" => Ok(NotifyEvent::AuctionEnded(decode(event_type, data)?)),
            other => Err(CoordinatorError::UnknownEventType {
                event_type: other.to_string(),
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(event_type: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| CoordinatorError::validation(format!("invalid {} data: {}", event_type, e)))
}

/// Relay an event from the authoritative service to the matching auction room
#[utoipa::path(
    post,
    path = "/notify",
    request_body = NotifyRequest,
    params(
        ("x-notify-secret" = Option<String>, Header, description = "Shared secret, required when configured")
    ),
    responses(
        (status = 200, description = "Event relayed", body = NotifyResponse),
        (status = 400, description = "Missing fields or unknown event type", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or wrong shared secret", body = crate::errors::ErrorResponse),
        (status = 409, description = "Auction has ended", body = crate::errors::ErrorResponse)
    ),
    tag = "ingress"
)]
pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<NotifyResponse>> {
    if let Some(secret) = &state.ingress.shared_secret {
        let presented = headers
            .get(NOTIFY_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(secret.as_str()) {
            log::warn!("Rejected notification with missing or wrong secret");
            return Err(CoordinatorError::Unauthorized);
        }
    }

    let Json(request) = body.map_err(|e| CoordinatorError::validation(e.body_text()))?;
    let event_type = request
        .event_type
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoordinatorError::validation("eventType is required"))?;
    let data = request
        .data
        .ok_or_else(|| CoordinatorError::validation("data is required"))?;

    let event = NotifyEvent::parse(&event_type, data).inspect_err(|e| {
        if let CoordinatorError::UnknownEventType { .. } = e {
            log::warn!("Unknown notification event type: {}", event_type);
        }
    })?;

    match event {
        NotifyEvent::NewBid(bid) => {
            state.rooms.relay_bid(&bid).await?;
            log::info!(
                "Relayed bid of {} by {} in auction {}",
                bid.amount,
                bid.bidder.id,
                bid.auction_id
            );
        }
        NotifyEvent::AuctionUpdate(update) => {
            let auction_id = update.auction_id.clone();
            let reached = state.rooms.relay_update(update).await?;
            log::debug!("Relayed update for auction {} to {} member(s)", auction_id, reached);
        }
        NotifyEvent::AuctionEnded(result) => {
            state.rooms.end_auction(result).await?;
        }
    }

    Ok(Json(NotifyResponse {
        message: "Notification processed successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_new_bid_accepts_underscore_id() {
        let event = NotifyEvent::parse(
            "newBid",
            json!({
                "auctionId": "a1",
                "bidData": {"bidAmount": 120.0, "bidder": {"_id": "u2", "name": "Bob"}}
            }),
        )
        .unwrap();

        match event {
            NotifyEvent::NewBid(bid) => {
                assert_eq!(bid.auction_id, "a1");
                assert_eq!(bid.bidder.id, "u2");
                assert_eq!(bid.amount, 120.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_new_bid_missing_bidder() {
        let err = NotifyEvent::parse(
            "newBid",
            json!({"auctionId": "a1", "bidData": {"bidAmount": 120.0}}),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_parse_auction_ended_requires_end_date() {
        let err = NotifyEvent::parse(
            "auctionEnded",
            json!({"auctionId": "a1", "winner": "u2", "finalPrice": 150.0}),
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_parse_auction_update_keeps_extra_fields() {
        let event = NotifyEvent::parse(
            "auctionUpdate",
            json!({"auctionId": "a1", "currentPrice": 90.5, "bidCount": 7}),
        )
        .unwrap();

        match event {
            NotifyEvent::AuctionUpdate(update) => {
                assert_eq!(update.current_price, Some(90.5));
                assert_eq!(update.extra.get("bidCount"), Some(&json!(7)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = NotifyEvent::parse("auctionPaused", json!({})).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_EVENT_TYPE");
    }
}
