//! Client events and actions.

use tether_core::{
    ConversationId, MessageId, MessageKey, QueueItemId, ReadReceipt, SenderId, ServerRecord,
    TempId, TimestampMs,
};

/// Identifier of one send attempt issued to the transport collaborator.
pub type AttemptId = u64;

/// What the transport collaborator is asked to deliver.
///
/// The temporary id must round-trip unchanged through the transport; it is
/// the reconciliation key for the echoed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Client-assigned identifier of the optimistic message.
    pub temp_id: TempId,
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Text body.
    pub content: String,
}

/// How a send attempt resolved at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The authoritative peer accepted the message.
    Accepted {
        /// Permanent id assigned by the peer.
        message_id: MessageId,
        /// Server-assigned timestamp.
        created_at: TimestampMs,
    },
    /// The attempt failed (network error, rejection, connection loss).
    Failed {
        /// Human-readable failure description, for logs.
        reason: String,
    },
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Forwarding user intents (send, retry, cancel, edit)
/// - Delivering transport notifications (inbound records, receipts)
/// - Reporting connectivity transitions
/// - Driving time forward via ticks
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and deterministic test environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// User wants to send a message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Text body.
        content: String,
    },

    /// User retries a failed message.
    RetryMessage {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Key of the failed message.
        key: MessageKey,
    },

    /// User cancels a queued send-intent before it is dispatched.
    CancelQueued {
        /// Queue-local id of the item.
        item_id: QueueItemId,
    },

    /// User edits a message's content.
    EditMessage {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Key of the message.
        key: MessageKey,
        /// Replacement text body.
        content: String,
    },

    /// A server-confirmed record arrived (own echo or inbound from a peer).
    MessageReceived(ServerRecord),

    /// The server acknowledged a send, naming the temporary id.
    MessageAcknowledged {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Temporary id the acknowledgment echoes.
        temp_id: TempId,
        /// Permanent id assigned by the peer.
        message_id: MessageId,
        /// Server-assigned timestamp.
        created_at: TimestampMs,
    },

    /// A delivery receipt named a message.
    MessageDelivered {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Permanent id of the delivered message.
        message_id: MessageId,
    },

    /// A read receipt named one or more messages.
    MessagesRead {
        /// Conversation holding the messages.
        conversation_id: ConversationId,
        /// Permanent ids of the read messages.
        message_ids: Vec<MessageId>,
        /// Reader record for group conversations; `None` in direct chats.
        reader: Option<ReadReceipt>,
    },

    /// A message was deleted remotely.
    MessageDeleted {
        /// Conversation holding the message.
        conversation_id: ConversationId,
        /// Permanent id of the deleted message.
        message_id: MessageId,
    },

    /// The transport resolved a previously dispatched send attempt.
    SendResolved {
        /// Attempt the resolution belongs to.
        attempt_id: AttemptId,
        /// Outcome of the attempt.
        outcome: SendOutcome,
    },

    /// Connectivity signal from the runtime environment.
    ///
    /// Duplicate notifications are tolerated; only actual transitions have
    /// an effect.
    ConnectivityChanged {
        /// Whether the client is now online.
        online: bool,
    },

    /// A peer came online.
    PeerOnline {
        /// Identity of the peer.
        user_id: SenderId,
    },

    /// A peer went offline.
    PeerOffline {
        /// Identity of the peer.
        user_id: SenderId,
    },

    /// Authoritative snapshot of currently online peers.
    PresenceSnapshot {
        /// Identities currently online.
        user_ids: Vec<SenderId>,
    },

    /// A peer started typing in a conversation.
    TypingStarted {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Identity of the typist.
        user_id: SenderId,
    },

    /// A peer stopped typing in a conversation.
    TypingStopped {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Identity of the typist.
        user_id: SenderId,
    },

    /// Time tick for timeout processing.
    ///
    /// The caller should send ticks periodically so the client can expire
    /// typing notifications, time out unresolved sends, and resume retry
    /// backoff.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Issue a send attempt via the transport collaborator.
    ///
    /// The caller must eventually feed back a
    /// [`ClientEvent::SendResolved`] carrying the same `attempt_id`. At most
    /// one queue-driven dispatch is outstanding at a time; the next queued
    /// item is only dispatched after this one resolves.
    DispatchSend {
        /// Attempt identifier to echo in the resolution.
        attempt_id: AttemptId,
        /// Message to deliver.
        outbound: OutboundMessage,
    },

    /// A conversation's messages changed; re-render its view.
    MessagesChanged {
        /// The affected conversation.
        conversation_id: ConversationId,
    },

    /// The offline queue changed; re-render its view.
    QueueChanged,

    /// The set of online peers changed.
    PresenceChanged,

    /// A conversation's typing set changed.
    TypingChanged {
        /// The affected conversation.
        conversation_id: ConversationId,
    },
}
