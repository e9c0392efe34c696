use auction_test_utils::identity;
use chrono::Utc;
use coordinator::errors::CoordinatorError;
use coordinator::models::api::ServerMessage;
use coordinator::models::domain::{
    AuctionResult, AuctionUpdate, BidEvent, Bidder, LifecycleState, Winner,
};
use coordinator::rooms::broadcast::Inbound;
use coordinator::rooms::{ConnectionGuard, RoomManager};
use serde_json::Map;
use std::collections::HashSet;
use std::sync::Arc;

const AUCTION: &str = "A1";

fn manager() -> Arc<RoomManager> {
    Arc::new(RoomManager::new(256))
}

async fn connect(rooms: &Arc<RoomManager>, user_id: &str) -> (ConnectionGuard, Inbound) {
    rooms.register(identity(user_id, &user_id.to_uppercase())).await
}

/// Everything queued for a connection so far
fn drain(inbound: &mut Inbound) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = inbound.try_recv() {
        messages.push((*message).clone());
    }
    messages
}

fn auction_result(auction_id: &str) -> AuctionResult {
    AuctionResult {
        auction_id: auction_id.to_string(),
        winner: Winner::Id("U2".to_string()),
        final_price: 150.0,
        end_date: Utc::now(),
    }
}

// ============================================================================
// Presence
// ============================================================================

#[tokio::test]
async fn test_two_tabs_per_user_count_once() {
    let rooms = manager();
    let (a1, mut a1_rx) = connect(&rooms, "A").await;
    let (a2, mut a2_rx) = connect(&rooms, "A").await;
    let (b1, mut b1_rx) = connect(&rooms, "B").await;
    let (b2, mut b2_rx) = connect(&rooms, "B").await;

    for guard in [&a1, &a2, &b1, &b2] {
        rooms.join(guard.id(), AUCTION).await.unwrap();
    }
    assert_eq!(rooms.watcher_count(AUCTION).await, 2);

    // A's second tab is not announced; B's first tab reaches both of A's tabs
    for rx in [&mut a1_rx, &mut a2_rx] {
        let joined: Vec<_> = drain(rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::UserJoined { .. }))
            .collect();
        assert_eq!(joined.len(), 1, "got {:?}", joined);
        assert!(matches!(&joined[0], ServerMessage::UserJoined { user_id, .. } if user_id == "B"));
    }
    drain(&mut b1_rx);
    drain(&mut b2_rx);

    a1.close().await;
    assert_eq!(rooms.watcher_count(AUCTION).await, 2);
    assert!(drain(&mut b1_rx).is_empty(), "closing one of two tabs is silent");

    a2.close().await;
    assert_eq!(rooms.watcher_count(AUCTION).await, 1);

    let events = drain(&mut b1_rx);
    assert_eq!(events.len(), 2, "got {:?}", events);
    assert!(matches!(
        &events[0],
        ServerMessage::UserLeft { user_id, auction_id, .. } if user_id == "A" && auction_id == AUCTION
    ));
    assert!(matches!(
        &events[1],
        ServerMessage::WatcherCount { count: 1, auction_id } if auction_id == AUCTION
    ));
    assert_eq!(drain(&mut b2_rx).len(), 2);
}

#[tokio::test]
async fn test_join_is_idempotent() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;

    rooms.join(u1.id(), AUCTION).await.unwrap();
    let first = rooms.join(u2.id(), AUCTION).await.unwrap();
    assert!(first.newly_joined);
    assert_eq!(first.watcher_count, 2);
    drain(&mut u1_rx);
    drain(&mut u2_rx);

    let again = rooms.join(u2.id(), AUCTION).await.unwrap();
    assert!(!again.newly_joined);
    assert_eq!(again.watcher_count, 2);
    assert_eq!(rooms.watcher_count(AUCTION).await, 2);
    assert!(drain(&mut u1_rx).is_empty(), "no duplicate userJoined");
    assert!(drain(&mut u2_rx).is_empty());
}

#[tokio::test]
async fn test_join_announces_to_others_and_counts_to_everyone() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;

    let outcome = rooms.join(u1.id(), AUCTION).await.unwrap();
    assert_eq!(outcome.watcher_count, 1);
    let events = drain(&mut u1_rx);
    assert_eq!(
        events,
        vec![ServerMessage::WatcherCount {
            auction_id: AUCTION.to_string(),
            count: 1
        }]
    );

    rooms.join(u2.id(), AUCTION).await.unwrap();

    let events = drain(&mut u1_rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        ServerMessage::UserJoined { user_id, user_name, .. } if user_id == "U2" && user_name == "U2"
    ));
    assert!(matches!(&events[1], ServerMessage::WatcherCount { count: 2, .. }));

    // The joiner sees the count but not its own userJoined
    let events = drain(&mut u2_rx);
    assert_eq!(
        events,
        vec![ServerMessage::WatcherCount {
            auction_id: AUCTION.to_string(),
            count: 2
        }]
    );
}

#[tokio::test]
async fn test_check_watching_reflects_own_join() {
    let rooms = manager();
    let (u1, _rx) = connect(&rooms, "U1").await;

    assert_eq!(rooms.watcher_count(AUCTION).await, 0);
    rooms.join(u1.id(), AUCTION).await.unwrap();
    assert_eq!(rooms.watcher_count(AUCTION).await, 1);
    assert!(rooms.is_member(u1.id(), AUCTION).await);
}

#[tokio::test]
async fn test_leave_is_idempotent() {
    let rooms = manager();
    let (u1, _u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;

    rooms.join(u1.id(), AUCTION).await.unwrap();
    rooms.join(u2.id(), AUCTION).await.unwrap();
    drain(&mut u2_rx);

    assert!(rooms.leave(u1.id(), AUCTION).await.unwrap());
    assert!(!rooms.leave(u1.id(), AUCTION).await.unwrap());
    assert!(!rooms.leave(u1.id(), "never-joined").await.unwrap());
    assert_eq!(rooms.watcher_count(AUCTION).await, 1);

    let left: Vec<_> = drain(&mut u2_rx)
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::UserLeft { .. }))
        .collect();
    assert_eq!(left.len(), 1);
}

#[tokio::test]
async fn test_join_rejects_empty_auction_id() {
    let rooms = manager();
    let (u1, _rx) = connect(&rooms, "U1").await;

    let err = rooms.join(u1.id(), "  ").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation { .. }));
    assert_eq!(rooms.stats().await.active_auctions, 0);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_equals_leaving_every_room() {
    let rooms = manager();
    let (leaver, _leaver_rx) = connect(&rooms, "L").await;
    let (watcher_a, mut a_rx) = connect(&rooms, "WA").await;
    let (watcher_b, mut b_rx) = connect(&rooms, "WB").await;

    rooms.join(watcher_a.id(), "A").await.unwrap();
    rooms.join(watcher_b.id(), "B").await.unwrap();
    rooms.join(leaver.id(), "A").await.unwrap();
    rooms.join(leaver.id(), "B").await.unwrap();
    rooms.join(leaver.id(), "C").await.unwrap();
    drain(&mut a_rx);
    drain(&mut b_rx);
    assert_eq!(rooms.stats().await.active_auctions, 3);

    let leaver_id = leaver.id();
    leaver.close().await;

    for (auction_id, rx) in [("A", &mut a_rx), ("B", &mut b_rx)] {
        let events = drain(rx);
        assert_eq!(events.len(), 2, "{}: {:?}", auction_id, events);
        assert!(matches!(&events[0], ServerMessage::UserLeft { user_id, .. } if user_id == "L"));
        assert!(matches!(&events[1], ServerMessage::WatcherCount { count: 1, .. }));
        assert_eq!(rooms.watcher_count(auction_id).await, 1);
        assert!(!rooms.is_member(leaver_id, auction_id).await);
    }

    // Rooms left empty are dropped
    assert_eq!(rooms.watcher_count("C").await, 0);
    assert_eq!(rooms.stats().await.active_auctions, 2);
}

#[tokio::test]
async fn test_disconnect_runs_once() {
    let rooms = manager();
    let (leaver, _leaver_rx) = connect(&rooms, "L").await;
    let (watcher, mut watcher_rx) = connect(&rooms, "W").await;

    rooms.join(watcher.id(), AUCTION).await.unwrap();
    rooms.join(leaver.id(), AUCTION).await.unwrap();
    drain(&mut watcher_rx);

    let leaver_id = leaver.id();
    let ((), (), left) = tokio::join!(
        rooms.disconnect(leaver_id),
        rooms.disconnect(leaver_id),
        rooms.leave(leaver_id, AUCTION),
    );
    left.unwrap();
    leaver.close().await;

    let left_events = drain(&mut watcher_rx)
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::UserLeft { .. }))
        .count();
    assert_eq!(left_events, 1, "exactly one net removal");
    assert_eq!(rooms.watcher_count(AUCTION).await, 1);
    assert_eq!(rooms.stats().await.connections, 1);
}

#[tokio::test]
async fn test_closed_connection_cannot_join() {
    let rooms = manager();
    let (u1, _rx) = connect(&rooms, "U1").await;
    let id = u1.id();
    u1.close().await;

    let err = rooms.join(id, AUCTION).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::ConnectionClosed));
    assert_eq!(rooms.watcher_count(AUCTION).await, 0);
}

#[tokio::test]
async fn test_dropped_guard_still_disconnects() {
    let rooms = manager();
    let (u1, _rx) = connect(&rooms, "U1").await;
    rooms.join(u1.id(), AUCTION).await.unwrap();
    drop(u1);

    for _ in 0..50 {
        if rooms.stats().await.connections == 0 {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    assert_eq!(rooms.stats().await.connections, 0);
    assert_eq!(rooms.watcher_count(AUCTION).await, 0);
}

// ============================================================================
// Bids and lifecycle
// ============================================================================

#[tokio::test]
async fn test_bid_reaches_others_but_not_originator() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;
    let (u3, mut u3_rx) = connect(&rooms, "U3").await;
    for guard in [&u1, &u2, &u3] {
        rooms.join(guard.id(), AUCTION).await.unwrap();
    }
    drain(&mut u1_rx);
    drain(&mut u2_rx);
    drain(&mut u3_rx);

    let bid = rooms.place_bid(u2.id(), AUCTION, 120.0, None).await.unwrap();
    assert_eq!(bid.bidder.id, "U2");

    for rx in [&mut u1_rx, &mut u3_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 2, "{:?}", events);
        assert!(matches!(
            &events[0],
            ServerMessage::NewBid { bid_amount, bidder, .. } if *bid_amount == 120.0 && bidder.id == "U2"
        ));
        assert!(matches!(
            &events[1],
            ServerMessage::AuctionUpdate(update)
                if update.current_price == Some(120.0) && update.last_bidder.as_deref() == Some("U2")
        ));
    }
    assert!(drain(&mut u2_rx).is_empty());
}

#[tokio::test]
async fn test_bid_validation() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    rooms.join(u1.id(), AUCTION).await.unwrap();
    drain(&mut u1_rx);

    for amount in [0.0, -5.0, f64::NAN] {
        let err = rooms.place_bid(u1.id(), AUCTION, amount, None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation { .. }));
    }
    let err = rooms.place_bid(u1.id(), "", 10.0, None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation { .. }));
}

#[tokio::test]
async fn test_relayed_bid_reaches_everyone() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;
    rooms.join(u1.id(), AUCTION).await.unwrap();
    rooms.join(u2.id(), AUCTION).await.unwrap();
    drain(&mut u1_rx);
    drain(&mut u2_rx);

    let bid = BidEvent {
        auction_id: AUCTION.to_string(),
        bidder: Bidder {
            id: "U9".to_string(),
            name: "Remote".to_string(),
        },
        amount: 300.0,
        timestamp: Utc::now(),
    };
    rooms.relay_bid(&bid).await.unwrap();

    for rx in [&mut u1_rx, &mut u2_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerMessage::NewBid { .. }));
        assert!(matches!(&events[1], ServerMessage::AuctionUpdate(_)));
    }
}

#[tokio::test]
async fn test_ended_auction_rejects_bids() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;
    rooms.join(u1.id(), AUCTION).await.unwrap();
    rooms.join(u2.id(), AUCTION).await.unwrap();
    drain(&mut u1_rx);
    drain(&mut u2_rx);

    let reached = rooms.end_auction(auction_result(AUCTION)).await.unwrap();
    assert_eq!(reached, 2);
    assert_eq!(rooms.lifecycle_state(AUCTION).await, LifecycleState::Ended);
    for rx in [&mut u1_rx, &mut u2_rx] {
        let events = drain(rx);
        assert!(matches!(
            events.as_slice(),
            [ServerMessage::AuctionEnded { final_price, .. }] if *final_price == 150.0
        ));
    }

    let err = rooms.place_bid(u2.id(), AUCTION, 200.0, None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::AuctionClosed { .. }));
    assert!(drain(&mut u1_rx).is_empty(), "rejected bid is not broadcast");

    let err = rooms.end_auction(auction_result(AUCTION)).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::AuctionClosed { .. }));

    // Membership stays usable after the end
    assert!(rooms.leave(u2.id(), AUCTION).await.unwrap());
    rooms.join(u2.id(), AUCTION).await.unwrap();
    assert_eq!(rooms.watcher_count(AUCTION).await, 2);
}

#[tokio::test]
async fn test_end_state_survives_empty_room() {
    let rooms = manager();

    rooms.end_auction(auction_result("quiet")).await.unwrap();
    let (u1, _rx) = connect(&rooms, "U1").await;
    rooms.join(u1.id(), "quiet").await.unwrap();

    let err = rooms.place_bid(u1.id(), "quiet", 10.0, None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::AuctionClosed { .. }));
}

#[tokio::test]
async fn test_bids_racing_end_never_follow_it() {
    let rooms = manager();
    let (observer, mut observer_rx) = connect(&rooms, "OBS").await;
    rooms.join(observer.id(), AUCTION).await.unwrap();

    let mut bidders = Vec::new();
    for i in 0..4 {
        let (guard, _rx) = connect(&rooms, &format!("B{}", i)).await;
        rooms.join(guard.id(), AUCTION).await.unwrap();
        bidders.push(guard);
    }
    drain(&mut observer_rx);

    let mut tasks = Vec::new();
    for guard in &bidders {
        let rooms = rooms.clone();
        let id = guard.id();
        tasks.push(tokio::spawn(async move {
            for n in 1..=20 {
                let _ = rooms.place_bid(id, AUCTION, n as f64, None).await;
                tokio::task::yield_now().await;
            }
        }));
    }
    {
        let rooms = rooms.clone();
        tasks.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            rooms.end_auction(auction_result(AUCTION)).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let events = drain(&mut observer_rx);
    let end_at = events
        .iter()
        .position(|m| matches!(m, ServerMessage::AuctionEnded { .. }))
        .expect("auctionEnded delivered");
    assert!(events[end_at + 1..]
        .iter()
        .all(|m| !matches!(m, ServerMessage::NewBid { .. } | ServerMessage::AuctionUpdate(_))));
}

// ============================================================================
// Typing and updates
// ============================================================================

#[tokio::test]
async fn test_typing_excludes_sender() {
    let rooms = manager();
    let (u1, mut u1_rx) = connect(&rooms, "U1").await;
    let (u2, mut u2_rx) = connect(&rooms, "U2").await;
    rooms.join(u1.id(), AUCTION).await.unwrap();
    rooms.join(u2.id(), AUCTION).await.unwrap();
    drain(&mut u1_rx);
    drain(&mut u2_rx);

    assert_eq!(rooms.typing(u1.id(), AUCTION, true).await.unwrap(), 1);
    assert!(drain(&mut u1_rx).is_empty());
    assert_eq!(
        drain(&mut u2_rx),
        vec![ServerMessage::UserTyping {
            auction_id: AUCTION.to_string(),
            user_id: "U1".to_string(),
            user_name: "U1".to_string(),
            is_typing: true,
        }]
    );
}

#[tokio::test]
async fn test_update_for_unwatched_auction_reaches_nobody() {
    let rooms = manager();
    let update = AuctionUpdate {
        auction_id: "nobody-here".to_string(),
        current_price: Some(10.0),
        last_bidder: None,
        timestamp: Utc::now(),
        extra: Map::new(),
    };
    assert_eq!(rooms.relay_update(update).await.unwrap(), 0);
    assert_eq!(rooms.stats().await.active_auctions, 0);
}

// ============================================================================
// Concurrent membership
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_membership_keeps_counts_exact() {
    let rooms = manager();
    let auctions = ["A", "B", "C"];

    let mut guards = Vec::new();
    let mut receivers = Vec::new();
    for user in 0..6 {
        for _tab in 0..2 {
            let (guard, rx) = connect(&rooms, &format!("user-{}", user)).await;
            guards.push(guard);
            receivers.push(rx);
        }
    }

    let mut tasks = Vec::new();
    for (n, guard) in guards.iter().enumerate() {
        let rooms = rooms.clone();
        let id = guard.id();
        tasks.push(tokio::spawn(async move {
            for step in 0..40usize {
                let auction_id = auctions[(n + step) % auctions.len()];
                if (n + step) % 3 == 0 {
                    let _ = rooms.leave(id, auction_id).await;
                } else {
                    let _ = rooms.join(id, auction_id).await;
                }
                if step % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    // Half of the tabs disconnect while the others are still moving
    let (closed, kept): (Vec<_>, Vec<_>) = guards
        .into_iter()
        .enumerate()
        .partition(|(n, _)| n % 2 == 0);
    for (_, guard) in closed {
        guard.close().await;
    }
    for task in tasks {
        task.await.unwrap();
    }

    for auction_id in auctions {
        let mut users = HashSet::new();
        for (_, guard) in &kept {
            if rooms.is_member(guard.id(), auction_id).await {
                users.insert(guard.identity().user_id.clone());
            }
        }
        assert_eq!(
            rooms.watcher_count(auction_id).await,
            users.len(),
            "auction {}",
            auction_id
        );
    }

    for (_, guard) in kept {
        guard.close().await;
    }
    for auction_id in auctions {
        assert_eq!(rooms.watcher_count(auction_id).await, 0);
    }
    let stats = rooms.stats().await;
    assert_eq!(stats.connections, 0);
    assert_eq!(stats.connected_users, 0);
    assert_eq!(stats.active_auctions, 0);
}

#[tokio::test]
async fn test_stats_count_distinct_users() {
    let rooms = manager();
    let (_a1, _) = connect(&rooms, "A").await;
    let (_a2, _) = connect(&rooms, "A").await;
    let (b1, _) = connect(&rooms, "B").await;
    rooms.join(b1.id(), AUCTION).await.unwrap();

    let stats = rooms.stats().await;
    assert_eq!(stats.connected_users, 2);
    assert_eq!(stats.connections, 3);
    assert_eq!(stats.active_auctions, 1);
}
