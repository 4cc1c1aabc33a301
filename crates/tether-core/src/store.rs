//! Per-conversation ordered message collections.
//!
//! Insertion order is authoritative display order; there is no independent
//! sequence number. The store enforces the dedup guard against duplicate
//! inbound delivery (append by an already-known permanent id is a silent
//! no-op) and the merge guard for optimistic sends (append by a known
//! temporary id merges into the existing entry instead of duplicating it).

use std::{collections::HashMap, fmt};

use crate::{
    error::StoreError,
    ids::{ConversationId, MessageId, TempId},
    message::{Message, ReadReceipt, TimestampMs},
    status::DeliveryStatus,
};

/// Lookup key for a message: permanent id or temporary id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    /// Server-assigned permanent identifier.
    Permanent(MessageId),
    /// Client-assigned temporary identifier.
    Temporary(TempId),
}

impl MessageKey {
    fn matches(&self, message: &Message) -> bool {
        match self {
            Self::Permanent(id) => message.id.as_ref() == Some(id),
            Self::Temporary(temp) => message.temp_id.as_ref() == Some(temp),
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent(id) => write!(f, "{id}"),
            Self::Temporary(temp) => write!(f, "{temp}"),
        }
    }
}

/// What [`MessageStore::append`] did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Appended as a new entry at the end of the conversation.
    Appended,
    /// Merged into an existing entry with the same temporary id.
    Merged,
    /// Dropped: an entry with the same permanent id already exists.
    DuplicateIgnored,
}

/// Ordered collection of messages per conversation.
///
/// Plainly owned, no global state: construct one per session and [`reset`]
/// it on logout.
///
/// [`reset`]: MessageStore::reset
#[derive(Debug, Default)]
pub struct MessageStore {
    by_conversation: HashMap<ConversationId, Vec<Message>>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of a conversation in insertion order. Empty for unknown
    /// conversations.
    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.by_conversation.get(conversation_id).map_or(&[], Vec::as_slice)
    }

    /// Conversations that currently hold at least one message.
    pub fn conversations(&self) -> impl Iterator<Item = &ConversationId> {
        self.by_conversation.keys()
    }

    /// Find a message by key.
    pub fn find(&self, conversation_id: &ConversationId, key: &MessageKey) -> Option<&Message> {
        self.by_conversation.get(conversation_id)?.iter().find(|m| key.matches(m))
    }

    /// Append a message, applying the dedup and merge guards.
    ///
    /// - A message whose permanent id already exists in the conversation is
    ///   dropped (duplicate inbound delivery, e.g. a reconnect replay).
    /// - A message whose temporary id matches an existing entry merges into
    ///   that entry: permanent id, timestamp and status are taken from the
    ///   incoming record and the temporary id is cleared.
    /// - Anything else is appended at the end.
    pub fn append(&mut self, message: Message) -> AppendOutcome {
        let conversation_id = message.conversation_id.clone();
        let entries = self.by_conversation.entry(conversation_id.clone()).or_default();

        if let Some(temp_id) = message.temp_id
            && let Some(entry) = entries.iter_mut().find(|m| m.temp_id == Some(temp_id))
        {
            Self::merge_confirmed(entry, message.id, message.created_at);
            debug_assert!(self.invariants_hold(&conversation_id));
            return AppendOutcome::Merged;
        }

        if let Some(id) = message.id.as_ref()
            && entries.iter().any(|m| m.id.as_ref() == Some(id))
        {
            return AppendOutcome::DuplicateIgnored;
        }

        entries.push(message);
        debug_assert!(self.invariants_hold(&conversation_id));
        AppendOutcome::Appended
    }

    /// Apply a server acknowledgment to the pending message with `temp_id`.
    ///
    /// Sets the permanent id, overwrites the client timestamp with the
    /// server's, clears the temporary id and lifts the status to at least
    /// `Sent` - including out of `Failed`, since the acknowledgment is
    /// authoritative proof the peer received the message.
    ///
    /// Returns `false` if no entry carries `temp_id` (local state was
    /// cleared, or the acknowledgment raced an inbound echo that already
    /// merged); callers log and move on.
    pub fn acknowledge(
        &mut self,
        conversation_id: &ConversationId,
        temp_id: TempId,
        message_id: MessageId,
        created_at: TimestampMs,
    ) -> bool {
        let Some(entries) = self.by_conversation.get_mut(conversation_id) else {
            return false;
        };

        // Never merge an id that is already present on another entry; the
        // acknowledgment is then a replay and the dedup guard wins.
        if entries.iter().any(|m| m.id.as_ref() == Some(&message_id)) {
            return false;
        }

        let Some(entry) = entries.iter_mut().find(|m| m.temp_id == Some(temp_id)) else {
            return false;
        };

        Self::merge_confirmed(entry, Some(message_id), created_at);
        debug_assert!(self.invariants_hold(conversation_id));
        true
    }

    /// Apply a receipt-driven status transition. Advance-only: stale
    /// receipts are absorbed. Returns whether the status changed.
    pub fn update_status(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
        status: DeliveryStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.find_mut(conversation_id, key)?.advance_status(status))
    }

    /// Mark a send attempt failed.
    pub fn mark_failed(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
    ) -> Result<(), StoreError> {
        self.find_mut(conversation_id, key)?.mark_failed();
        Ok(())
    }

    /// Explicit user retry: `Failed → Pending`. Returns `false` if the
    /// message was not failed.
    pub fn mark_retrying(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
    ) -> Result<bool, StoreError> {
        Ok(self.find_mut(conversation_id, key)?.mark_retrying())
    }

    /// Tombstone a delivered message.
    pub fn mark_deleted(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        self.find_mut(conversation_id, &MessageKey::Permanent(message_id.clone()))?.tombstone();
        Ok(())
    }

    /// Append a reader record to a group message. Returns whether the
    /// record was new.
    pub fn record_reader(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        receipt: ReadReceipt,
    ) -> Result<bool, StoreError> {
        Ok(self
            .find_mut(conversation_id, &MessageKey::Permanent(message_id.clone()))?
            .record_reader(receipt))
    }

    /// Replace a message's content via explicit edit.
    pub fn edit(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
        content: impl Into<String>,
        at: TimestampMs,
    ) -> Result<(), StoreError> {
        self.find_mut(conversation_id, key)?.apply_edit(content, at);
        Ok(())
    }

    /// Drop all conversations. Session-lifecycle operation (logout).
    pub fn reset(&mut self) {
        self.by_conversation.clear();
    }

    fn find_mut(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
    ) -> Result<&mut Message, StoreError> {
        self.by_conversation
            .get_mut(conversation_id)
            .and_then(|entries| entries.iter_mut().find(|m| key.matches(m)))
            .ok_or_else(|| StoreError::MessageNotFound {
                conversation_id: conversation_id.clone(),
                key: key.clone(),
            })
    }

    fn merge_confirmed(entry: &mut Message, id: Option<MessageId>, created_at: TimestampMs) {
        entry.id = id;
        entry.created_at = created_at;
        entry.temp_id = None;
        if !entry.status.is_at_least(DeliveryStatus::Sent) {
            entry.status = DeliveryStatus::Sent;
        }
    }

    /// Uniqueness of temporary and permanent ids within a conversation.
    /// Violations indicate an allocator or reconciler defect.
    fn invariants_hold(&self, conversation_id: &ConversationId) -> bool {
        let Some(entries) = self.by_conversation.get(conversation_id) else {
            return true;
        };

        for (i, message) in entries.iter().enumerate() {
            let rest = &entries[i + 1..];
            if message.temp_id.is_some() && rest.iter().any(|m| m.temp_id == message.temp_id) {
                return false;
            }
            if message.id.is_some() && rest.iter().any(|m| m.id == message.id) {
                return false;
            }
        }
        true
    }
}
