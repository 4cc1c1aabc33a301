//! Peer typing indicators with deadline-based expiry.
//!
//! Each typing entry carries an explicit expiry deadline checked at `Tick`,
//! so cleanup is structural: dropping the tracker drops every pending
//! expiry with it.

use std::collections::HashMap;

use tether_core::{ConversationId, SenderId};

struct TypingEntry<I> {
    user_id: SenderId,
    expires_at: I,
}

/// Per-conversation sets of currently-typing peers.
#[derive(Default)]
pub struct TypingTracker<I> {
    by_conversation: HashMap<ConversationId, Vec<TypingEntry<I>>>,
}

impl<I: Copy + Ord> TypingTracker<I> {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self { by_conversation: HashMap::new() }
    }

    /// Record that a peer is typing until `expires_at`. A repeated start
    /// refreshes the deadline. Returns whether the visible set changed.
    pub fn started(
        &mut self,
        conversation_id: ConversationId,
        user_id: SenderId,
        expires_at: I,
    ) -> bool {
        let entries = self.by_conversation.entry(conversation_id).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.user_id == user_id) {
            entry.expires_at = expires_at;
            return false;
        }
        entries.push(TypingEntry { user_id, expires_at });
        true
    }

    /// Record that a peer stopped typing. Returns whether it was present.
    pub fn stopped(&mut self, conversation_id: &ConversationId, user_id: &SenderId) -> bool {
        let Some(entries) = self.by_conversation.get_mut(conversation_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.user_id != *user_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.by_conversation.remove(conversation_id);
        }
        removed
    }

    /// Drop entries whose deadline has passed. Returns the conversations
    /// whose visible set changed.
    pub fn expire(&mut self, now: I) -> Vec<ConversationId> {
        let mut changed = Vec::new();
        self.by_conversation.retain(|conversation_id, entries| {
            let before = entries.len();
            entries.retain(|e| e.expires_at > now);
            if entries.len() != before {
                changed.push(conversation_id.clone());
            }
            !entries.is_empty()
        });
        changed
    }

    /// Peers currently typing in a conversation.
    pub fn typing_peers(&self, conversation_id: &ConversationId) -> Vec<&SenderId> {
        self.by_conversation
            .get(conversation_id)
            .map(|entries| entries.iter().map(|e| &e.user_id).collect())
            .unwrap_or_default()
    }

    /// Drop all entries. Session-lifecycle operation (logout).
    pub fn clear(&mut self) {
        self.by_conversation.clear();
    }
}
