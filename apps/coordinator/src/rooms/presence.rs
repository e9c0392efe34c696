//! Per-room presence: connections per user, collapsed into a distinct-watcher count

use std::collections::HashMap;

use crate::models::domain::UserId;

/// Reference count of connections per user. A user is a watcher while the count is above zero.
#[derive(Debug, Default)]
pub struct PresenceTally {
    connections_per_user: HashMap<UserId, usize>,
}

impl PresenceTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more connection for `user_id`
    /// Returns true if this is the user's first connection
    pub fn add(&mut self, user_id: &str) -> bool {
        let refs = self
            .connections_per_user
            .entry(user_id.to_string())
            .or_insert(0);
        *refs += 1;
        *refs == 1
    }

    /// Count one connection less for `user_id`
    /// Returns true if that was the user's last connection
    pub fn remove(&mut self, user_id: &str) -> bool {
        match self.connections_per_user.get_mut(user_id) {
            Some(refs) if *refs > 1 => {
                *refs -= 1;
                false
            }
            Some(_) => {
                self.connections_per_user.remove(user_id);
                true
            }
            None => false,
        }
    }

    /// Number of distinct users present
    pub fn watcher_count(&self) -> usize {
        self.connections_per_user.len()
    }

    pub fn connections_of(&self, user_id: &str) -> usize {
        self.connections_per_user.get(user_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.connections_per_user.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last_connection_transitions() {
        let mut tally = PresenceTally::new();

        assert!(tally.add("alice"));
        assert!(!tally.add("alice"));
        assert!(tally.add("bob"));
        assert_eq!(tally.watcher_count(), 2);
        assert_eq!(tally.connections_of("alice"), 2);

        assert!(!tally.remove("alice"));
        assert_eq!(tally.watcher_count(), 2);
        assert!(tally.remove("alice"));
        assert_eq!(tally.watcher_count(), 1);
        assert_eq!(tally.connections_of("alice"), 0);
    }

    #[test]
    fn test_remove_unknown_user_is_noop() {
        let mut tally = PresenceTally::new();
        assert!(!tally.remove("ghost"));
        assert!(tally.is_empty());
    }
}
