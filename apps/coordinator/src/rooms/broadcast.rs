//! Event fan-out to room members
//!
//! Delivery only enqueues onto each connection's bounded outbound queue; the
//! connection's writer task does the socket write. A full queue drops the
//! message for that connection instead of blocking the room.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::models::api::ServerMessage;
use crate::models::domain::{ConnectionId, Identity};

pub type Outbound = mpsc::Sender<Arc<ServerMessage>>;
pub type Inbound = mpsc::Receiver<Arc<ServerMessage>>;

/// Who in a room receives an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Except(ConnectionId),
}

impl Audience {
    pub fn includes(&self, connection_id: &ConnectionId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Except(excluded) => excluded != connection_id,
        }
    }
}

/// Subscription a room holds for one joined connection, from join until leave or disconnect
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub identity: Arc<Identity>,
    outbound: Outbound,
}

impl Subscriber {
    pub fn new(identity: Arc<Identity>, outbound: Outbound) -> Self {
        Self { identity, outbound }
    }

    /// Enqueue a message for this connection. Returns false if it was dropped.
    pub fn send(&self, connection_id: &ConnectionId, message: Arc<ServerMessage>) -> bool {
        enqueue(&self.outbound, connection_id, message)
    }
}

/// Enqueue `message` for every subscriber in `audience`. Returns the number of connections reached.
pub fn deliver<'a>(
    subscribers: impl IntoIterator<Item = (&'a ConnectionId, &'a Subscriber)>,
    audience: Audience,
    message: ServerMessage,
) -> usize {
    let message = Arc::new(message);
    subscribers
        .into_iter()
        .filter(|(id, _)| audience.includes(id))
        .filter(|(id, subscriber)| subscriber.send(id, message.clone()))
        .count()
}

pub(crate) fn enqueue(
    outbound: &Outbound,
    connection_id: &ConnectionId,
    message: Arc<ServerMessage>,
) -> bool {
    match outbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            log::warn!(
                "Outbound queue full for connection {}, dropping {:?}",
                connection_id,
                message
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("Connection {} is gone, message not delivered", connection_id);
            false
        }
    }
}
