//! Client error types.

use thiserror::Error;

use tether_core::{ConversationId, MessageKey, QueueError, StoreError};

use crate::event::AttemptId;

/// Errors from [`crate::Client`] operations.
///
/// Transport failures never appear here - they are converted to message
/// status values at the point of resolution. These errors mean the caller
/// asked for something the current state does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A store lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Retry was requested for a message that is not in `Failed`.
    #[error("message {key} in conversation {conversation_id} is not failed and cannot be retried")]
    RetryNotFailed {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Key of the message.
        key: MessageKey,
    },

    /// A send resolution named an attempt this client never issued.
    #[error("no send attempt with id {attempt_id}")]
    UnknownAttempt {
        /// The unrecognized attempt id.
        attempt_id: AttemptId,
    },
}
