//! Auction room coordination
//!
//! [`RoomManager`] owns every piece of shared room state: the room table
//! (auction id → room, each room carrying its presence tally), the
//! per-connection reverse index of joined rooms, and the lifecycle book.
//! Nothing else reads or writes that state.
//!
//! Locking:
//! - one `Mutex<Room>` per auction, so operations on different auctions never
//!   wait on each other beyond the brief room table lookup
//! - one `Mutex` per connection guarding its joined-room index
//! - acquisition order is connection → room → room table, never the reverse
//!
//! Events are enqueued to member queues while the room lock is held, which
//! gives every member the same order of events for a room. Socket writes happen
//! later in each connection's writer task.

pub mod broadcast;
pub mod lifecycle;
pub mod presence;
pub mod room;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};

use crate::errors::{CoordinatorError, Result};
use crate::models::api::ServerMessage;
use crate::models::domain::{
    AuctionId, AuctionResult, AuctionUpdate, BidEvent, Bidder, Connection, ConnectionId,
    Identity, LifecycleState,
};
use broadcast::{Audience, Inbound, Outbound, Subscriber};
use lifecycle::LifecycleBook;
use presence::PresenceTally;
use room::Room;

type SharedRoom = Arc<Mutex<Room>>;

/// Result of a `join`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// False when the connection was already in the room
    pub newly_joined: bool,
    pub watcher_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStats {
    pub connected_users: usize,
    pub connections: usize,
    pub active_auctions: usize,
}

/// Per-connection state held by the manager
struct ConnectionSlot {
    connection: Connection,
    outbound: Outbound,
    /// Rooms this connection is in. `None` once the connection is closed.
    rooms: Mutex<Option<HashSet<AuctionId>>>,
}

pub struct RoomManager {
    rooms: RwLock<HashMap<AuctionId, SharedRoom>>,
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionSlot>>>,
    online: Mutex<PresenceTally>,
    lifecycle: LifecycleBook,
    outbound_buffer: usize,
}

impl RoomManager {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            online: Mutex::new(PresenceTally::new()),
            lifecycle: LifecycleBook::new(),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Register an admitted connection
    ///
    /// Returns the guard that owns the connection's membership and the
    /// receiving end of its outbound queue.
    pub async fn register(self: &Arc<Self>, identity: Identity) -> (ConnectionGuard, Inbound) {
        let (outbound, inbound) = mpsc::channel(self.outbound_buffer);
        let connection = Connection {
            id: ConnectionId::new(),
            identity: Arc::new(identity),
            authenticated_at: Utc::now(),
        };

        let slot = Arc::new(ConnectionSlot {
            connection: connection.clone(),
            outbound: outbound.clone(),
            rooms: Mutex::new(Some(HashSet::new())),
        });
        self.connections.write().await.insert(connection.id, slot);
        self.online.lock().await.add(&connection.identity.user_id);

        log::info!(
            "User {} ({}) connected as {}",
            connection.identity.display_name,
            connection.identity.user_id,
            connection.id
        );

        let guard = ConnectionGuard {
            manager: self.clone(),
            connection,
            outbound,
            closed: false,
        };
        (guard, inbound)
    }

    /// Drop a connection and leave every room it joined
    ///
    /// Safe to call more than once and to race with `leave`; only the first
    /// call has any effect.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(slot) = self.connections.write().await.remove(&connection_id) else {
            return;
        };

        let joined = slot.rooms.lock().await.take().unwrap_or_default();
        for auction_id in &joined {
            self.depart(connection_id, auction_id).await;
        }
        self.online
            .lock()
            .await
            .remove(&slot.connection.identity.user_id);

        log::info!(
            "User {} disconnected ({}), left {} room(s)",
            slot.connection.identity.display_name,
            connection_id,
            joined.len()
        );
    }

    /// Disconnect every connection. Used at shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<ConnectionId> = self.connections.read().await.keys().copied().collect();
        for id in ids {
            self.disconnect(id).await;
        }
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Add a connection to an auction room. Re-joining is a no-op.
    pub async fn join(&self, connection_id: ConnectionId, auction_id: &str) -> Result<JoinOutcome> {
        require_auction_id(auction_id)?;
        let slot = self.slot(connection_id).await?;
        let mut index = slot.rooms.lock().await;
        let joined = index.as_mut().ok_or(CoordinatorError::ConnectionClosed)?;

        if joined.contains(auction_id) {
            return Ok(JoinOutcome {
                newly_joined: false,
                watcher_count: self.watcher_count(auction_id).await,
            });
        }

        let mut room = self.acquire_room(auction_id).await;
        let subscriber = Subscriber::new(slot.connection.identity.clone(), slot.outbound.clone());
        let Some(change) = room.admit(connection_id, subscriber) else {
            // Already in the room without an index entry
            joined.insert(auction_id.to_string());
            return Ok(JoinOutcome {
                newly_joined: false,
                watcher_count: room.watcher_count(),
            });
        };
        joined.insert(auction_id.to_string());

        let identity = &slot.connection.identity;
        log::debug!(
            "User {} joined auction {} ({} watching)",
            identity.display_name,
            auction_id,
            change.watcher_count
        );

        if change.user_changed {
            room.broadcast(
                Audience::Except(connection_id),
                ServerMessage::UserJoined {
                    auction_id: auction_id.to_string(),
                    user_id: identity.user_id.clone(),
                    user_name: identity.display_name.clone(),
                    timestamp: Utc::now(),
                },
            );
            room.broadcast(
                Audience::Everyone,
                ServerMessage::WatcherCount {
                    auction_id: auction_id.to_string(),
                    count: change.watcher_count,
                },
            );
        }

        Ok(JoinOutcome {
            newly_joined: true,
            watcher_count: change.watcher_count,
        })
    }

    /// Remove a connection from an auction room
    /// Returns false if it was not a member (including after disconnect)
    pub async fn leave(&self, connection_id: ConnectionId, auction_id: &str) -> Result<bool> {
        let Ok(slot) = self.slot(connection_id).await else {
            return Ok(false);
        };
        let mut index = slot.rooms.lock().await;
        let Some(joined) = index.as_mut() else {
            return Ok(false);
        };
        if !joined.remove(auction_id) {
            return Ok(false);
        }

        self.depart(connection_id, auction_id).await;
        Ok(true)
    }

    /// Distinct users currently watching an auction
    pub async fn watcher_count(&self, auction_id: &str) -> usize {
        match self.lock_live_room(auction_id).await {
            Some(room) => room.watcher_count(),
            None => 0,
        }
    }

    /// Whether a connection is currently a member of an auction room
    pub async fn is_member(&self, connection_id: ConnectionId, auction_id: &str) -> bool {
        match self.lock_live_room(auction_id).await {
            Some(room) => room.contains(&connection_id),
            None => false,
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Relay a bid placed by a connected client to the rest of the room
    pub async fn place_bid(
        &self,
        connection_id: ConnectionId,
        auction_id: &str,
        amount: f64,
        bid_time: Option<chrono::DateTime<Utc>>,
    ) -> Result<BidEvent> {
        let slot = self.slot(connection_id).await?;
        let identity = &slot.connection.identity;

        let bid = BidEvent {
            auction_id: auction_id.to_string(),
            bidder: Bidder {
                id: identity.user_id.clone(),
                name: identity.display_name.clone(),
            },
            amount,
            timestamp: bid_time.unwrap_or_else(Utc::now),
        };
        validate_bid(&bid)?;

        self.publish_bid(&bid, Audience::Except(connection_id)).await?;
        log::info!(
            "Bid placed by {} in auction {}: {}",
            identity.display_name,
            auction_id,
            amount
        );
        Ok(bid)
    }

    /// Relay a bid accepted by the authoritative service to the whole room
    pub async fn relay_bid(&self, bid: &BidEvent) -> Result<()> {
        validate_bid(bid)?;
        self.publish_bid(bid, Audience::Everyone).await
    }

    /// Relay an aggregate price update to the whole room
    pub async fn relay_update(&self, update: AuctionUpdate) -> Result<usize> {
        require_auction_id(&update.auction_id)?;
        Ok(match self.lock_live_room(&update.auction_id).await {
            Some(room) => room.broadcast(Audience::Everyone, ServerMessage::AuctionUpdate(update)),
            None => 0,
        })
    }

    /// Mark an auction ended and tell the whole room
    pub async fn end_auction(&self, result: AuctionResult) -> Result<usize> {
        require_auction_id(&result.auction_id)?;
        if !result.final_price.is_finite() || result.final_price < 0.0 {
            return Err(CoordinatorError::validation("finalPrice must be a non-negative number"));
        }

        let reached = loop {
            if let Some(room) = self.lock_live_room(&result.auction_id).await {
                self.lifecycle.end(&result.auction_id).await?;
                break room.broadcast(
                    Audience::Everyone,
                    ServerMessage::AuctionEnded {
                        auction_id: result.auction_id.clone(),
                        winner: result.winner,
                        final_price: result.final_price,
                        end_date: result.end_date,
                    },
                );
            }

            // No room: holding the table keeps one from being created meanwhile
            let rooms = self.rooms.read().await;
            if !rooms.contains_key(&result.auction_id) {
                self.lifecycle.end(&result.auction_id).await?;
                break 0;
            }
        };

        log::info!("Auction {} ended", result.auction_id);
        Ok(reached)
    }

    /// Ephemeral typing indicator to the rest of the room
    pub async fn typing(
        &self,
        connection_id: ConnectionId,
        auction_id: &str,
        is_typing: bool,
    ) -> Result<usize> {
        require_auction_id(auction_id)?;
        let slot = self.slot(connection_id).await?;
        let identity = &slot.connection.identity;

        Ok(match self.lock_live_room(auction_id).await {
            Some(room) => room.broadcast(
                Audience::Except(connection_id),
                ServerMessage::UserTyping {
                    auction_id: auction_id.to_string(),
                    user_id: identity.user_id.clone(),
                    user_name: identity.display_name.clone(),
                    is_typing,
                },
            ),
            None => 0,
        })
    }

    pub async fn lifecycle_state(&self, auction_id: &str) -> LifecycleState {
        self.lifecycle.state(auction_id).await
    }

    pub async fn stats(&self) -> RoomStats {
        let connections = self.connections.read().await.len();
        let connected_users = self.online.lock().await.watcher_count();
        let active_auctions = self.rooms.read().await.len();
        RoomStats {
            connected_users,
            connections,
            active_auctions,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn slot(&self, connection_id: ConnectionId) -> Result<Arc<ConnectionSlot>> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .cloned()
            .ok_or(CoordinatorError::ConnectionClosed)
    }

    async fn find_room(&self, auction_id: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(auction_id).cloned()
    }

    /// Lock the room currently linked for `auction_id`, skipping rooms retired while we waited
    async fn lock_live_room(&self, auction_id: &str) -> Option<OwnedMutexGuard<Room>> {
        loop {
            let room = self.find_room(auction_id).await?.lock_owned().await;
            if !room.retired {
                return Some(room);
            }
        }
    }

    /// Lock the live room for `auction_id`, creating it if needed
    async fn acquire_room(&self, auction_id: &str) -> OwnedMutexGuard<Room> {
        loop {
            let room = match self.find_room(auction_id).await {
                Some(room) => room,
                None => self
                    .rooms
                    .write()
                    .await
                    .entry(auction_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(Room::new())))
                    .clone(),
            };

            let guard = room.lock_owned().await;
            // Emptied and unlinked while we waited; look again
            if !guard.retired {
                return guard;
            }
        }
    }

    /// Take a connection out of a room, emit presence events, and unlink the room if it emptied
    async fn depart(&self, connection_id: ConnectionId, auction_id: &str) {
        let Some(shared) = self.find_room(auction_id).await else {
            return;
        };
        let mut room = shared.clone().lock_owned().await;

        if let Some((subscriber, change)) = room.release(&connection_id) {
            log::debug!(
                "User {} left auction {} ({} watching)",
                subscriber.identity.display_name,
                auction_id,
                change.watcher_count
            );

            if change.user_changed {
                room.broadcast(
                    Audience::Everyone,
                    ServerMessage::UserLeft {
                        auction_id: auction_id.to_string(),
                        user_id: subscriber.identity.user_id.clone(),
                        user_name: subscriber.identity.display_name.clone(),
                        timestamp: Utc::now(),
                    },
                );
                room.broadcast(
                    Audience::Everyone,
                    ServerMessage::WatcherCount {
                        auction_id: auction_id.to_string(),
                        count: change.watcher_count,
                    },
                );
            }
        }

        if room.is_empty() && !room.retired {
            room.retired = true;
            let mut rooms = self.rooms.write().await;
            if rooms
                .get(auction_id)
                .is_some_and(|current| Arc::ptr_eq(current, &shared))
            {
                rooms.remove(auction_id);
            }
        }
    }

    async fn publish_bid(&self, bid: &BidEvent, audience: Audience) -> Result<()> {
        let Some(room) = self.lock_live_room(&bid.auction_id).await else {
            return self.lifecycle.ensure_open(&bid.auction_id).await;
        };

        self.lifecycle.ensure_open(&bid.auction_id).await?;
        room.broadcast(
            audience,
            ServerMessage::NewBid {
                auction_id: bid.auction_id.clone(),
                bid_amount: bid.amount,
                bidder: bid.bidder.clone(),
                bid_time: bid.timestamp,
            },
        );
        room.broadcast(audience, ServerMessage::AuctionUpdate(bid.into()));
        Ok(())
    }
}

fn require_auction_id(auction_id: &str) -> Result<()> {
    if auction_id.trim().is_empty() {
        return Err(CoordinatorError::validation("auctionId is required"));
    }
    Ok(())
}

fn validate_bid(bid: &BidEvent) -> Result<()> {
    require_auction_id(&bid.auction_id)?;
    if !bid.amount.is_finite() || bid.amount <= 0.0 {
        return Err(CoordinatorError::validation("bidAmount must be a positive number"));
    }
    if bid.bidder.id.is_empty() {
        return Err(CoordinatorError::validation("bidder id is required"));
    }
    Ok(())
}

// ============================================================================
// ConnectionGuard - scoped ownership of one connection's membership
// ============================================================================

/// Owns a registered connection. Closing it (or dropping it) disconnects the
/// connection from every room exactly once.
pub struct ConnectionGuard {
    manager: Arc<RoomManager>,
    connection: Connection,
    outbound: Outbound,
    closed: bool,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }

    pub fn identity(&self) -> &Identity {
        &self.connection.identity
    }

    pub fn manager(&self) -> &Arc<RoomManager> {
        &self.manager
    }

    /// Send a message to this connection only
    pub fn reply(&self, message: ServerMessage) -> bool {
        broadcast::enqueue(&self.outbound, &self.connection.id, Arc::new(message))
    }

    pub async fn close(mut self) {
        self.closed = true;
        self.manager.disconnect(self.connection.id).await;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let manager = self.manager.clone();
        let connection_id = self.connection.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    manager.disconnect(connection_id).await;
                });
            }
            Err(_) => {
                log::warn!(
                    "Connection {} dropped outside a runtime, room cleanup skipped",
                    connection_id
                );
            }
        }
    }
}
