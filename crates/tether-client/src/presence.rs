//! Online-peer roster.

use std::collections::HashSet;

use tether_core::SenderId;

/// Set of peers currently reported online.
///
/// Updates are idempotent: repeated online/offline notifications for the
/// same peer have no effect beyond the first.
#[derive(Debug, Default)]
pub struct PresenceRoster {
    online: HashSet<SenderId>,
}

impl PresenceRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with an authoritative snapshot. Returns whether
    /// anything changed.
    pub fn set_all(&mut self, user_ids: impl IntoIterator<Item = SenderId>) -> bool {
        let next: HashSet<SenderId> = user_ids.into_iter().collect();
        let changed = next != self.online;
        self.online = next;
        changed
    }

    /// Mark a peer online. Returns whether it was newly online.
    pub fn mark_online(&mut self, user_id: SenderId) -> bool {
        self.online.insert(user_id)
    }

    /// Mark a peer offline. Returns whether it was online before.
    pub fn mark_offline(&mut self, user_id: &SenderId) -> bool {
        self.online.remove(user_id)
    }

    /// Whether a peer is currently online.
    pub fn is_online(&self, user_id: &SenderId) -> bool {
        self.online.contains(user_id)
    }

    /// Currently online peers, in no particular order.
    pub fn online_peers(&self) -> impl Iterator<Item = &SenderId> {
        self.online.iter()
    }

    /// Drop all entries. Session-lifecycle operation (logout).
    pub fn clear(&mut self) {
        self.online.clear();
    }
}
