//! A single auction room: member connections plus their presence tally

use std::collections::HashMap;

use super::broadcast::{deliver, Audience, Subscriber};
use super::presence::PresenceTally;
use crate::models::api::ServerMessage;
use crate::models::domain::ConnectionId;

/// Effect of a membership change on presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    /// The user appeared in (or vanished from) the room
    pub user_changed: bool,
    pub watcher_count: usize,
}

#[derive(Debug, Default)]
pub struct Room {
    members: HashMap<ConnectionId, Subscriber>,
    presence: PresenceTally,
    /// Set once the room has been unlinked from the room table
    pub(super) retired: bool,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains_key(connection_id)
    }

    pub fn watcher_count(&self) -> usize {
        self.presence.watcher_count()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a connection. Returns None if it was already a member.
    pub fn admit(
        &mut self,
        connection_id: ConnectionId,
        subscriber: Subscriber,
    ) -> Option<PresenceChange> {
        if self.members.contains_key(&connection_id) {
            return None;
        }
        let user_changed = self.presence.add(&subscriber.identity.user_id);
        self.members.insert(connection_id, subscriber);
        Some(PresenceChange {
            user_changed,
            watcher_count: self.watcher_count(),
        })
    }

    /// Remove a connection. Returns None if it was not a member.
    pub fn release(&mut self, connection_id: &ConnectionId) -> Option<(Subscriber, PresenceChange)> {
        let subscriber = self.members.remove(connection_id)?;
        let user_changed = self.presence.remove(&subscriber.identity.user_id);
        let change = PresenceChange {
            user_changed,
            watcher_count: self.watcher_count(),
        };
        Some((subscriber, change))
    }

    pub fn broadcast(&self, audience: Audience, message: ServerMessage) -> usize {
        deliver(&self.members, audience, message)
    }
}
