use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::errors::{CoordinatorError, Result};
use crate::models::domain::{AuctionId, LifecycleState};

/// Lifecycle of every auction seen by this process. `Ended` is terminal and
/// outlives the auction's room.
#[derive(Debug, Default)]
pub struct LifecycleBook {
    ended: RwLock<HashSet<AuctionId>>,
}

impl LifecycleBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, auction_id: &str) -> LifecycleState {
        if self.ended.read().await.contains(auction_id) {
            LifecycleState::Ended
        } else {
            LifecycleState::Open
        }
    }

    /// Fails with `AuctionClosed` if the auction has ended
    pub async fn ensure_open(&self, auction_id: &str) -> Result<()> {
        match self.state(auction_id).await {
            LifecycleState::Open => Ok(()),
            LifecycleState::Ended => Err(CoordinatorError::AuctionClosed {
                auction_id: auction_id.to_string(),
            }),
        }
    }

    /// Move an auction to `Ended`. Fails with `AuctionClosed` if it already was.
    pub async fn end(&self, auction_id: &str) -> Result<()> {
        if self.ended.write().await.insert(auction_id.to_string()) {
            Ok(())
        } else {
            Err(CoordinatorError::AuctionClosed {
                auction_id: auction_id.to_string(),
            })
        }
    }
}
