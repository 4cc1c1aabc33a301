//! Error types for the delivery core.
//!
//! Strongly-typed errors per component. Contract violations (duplicate
//! identifiers inside a conversation) are not represented here - they are
//! checked with debug assertions in the store, because they indicate a broken
//! allocator or reconciler rather than a recoverable condition.

use thiserror::Error;

use crate::{queue::QueueItemId, store::MessageKey};

/// Errors from [`crate::MessageStore`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No message matched the given key in the conversation.
    #[error("message {key} not found in conversation {conversation_id}")]
    MessageNotFound {
        /// Conversation that was searched.
        conversation_id: crate::ConversationId,
        /// Key that failed to match.
        key: MessageKey,
    },
}

/// Errors from [`crate::OfflineQueue`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No queued item carries the given id.
    #[error("queued item {id} not found")]
    ItemNotFound {
        /// Queue-local id that failed to match.
        id: QueueItemId,
    },

    /// The item has an attempt in flight and cannot be mutated.
    #[error("queued item {id} is in flight and cannot be cancelled")]
    ItemInFlight {
        /// Queue-local id of the in-flight item.
        id: QueueItemId,
    },

    /// Attempted to begin an attempt on an item that is not dispatchable.
    #[error("queued item {id} is not pending")]
    ItemNotPending {
        /// Queue-local id of the item.
        id: QueueItemId,
    },
}
