//! Reconciliation of server-confirmed records with local state.
//!
//! The common case is a record echoing a message this client sent: the
//! record's temporary id matches a pending local entry and the two merge.
//! Everything else is either a duplicate delivery (absorbed) or a genuinely
//! new inbound message.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{ConversationId, MessageId, SenderId, TempId},
    message::{Message, TimestampMs},
    status::DeliveryStatus,
    store::{AppendOutcome, MessageStore},
};

/// A message record as confirmed by the authoritative remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Permanent identifier.
    pub id: MessageId,
    /// Echo of the client-assigned temporary id, if the record originated
    /// from this client and the transport round-tripped it.
    pub temp_id: Option<TempId>,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Originating identity.
    pub sender_id: SenderId,
    /// Text body.
    pub content: String,
    /// Server-assigned timestamp.
    pub created_at: TimestampMs,
}

/// What [`reconcile`] did with a record.
///
/// An explicit tagged result, so callers react distinctly instead of
/// inferring behavior from mutation side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// The record confirmed a pending local message; the entry's permanent
    /// id, timestamp and status were updated in place.
    Merged,
    /// An entry with this permanent id already exists; the record was
    /// dropped (duplicate delivery, e.g. a reconnect replay).
    DuplicateIgnored,
    /// No local counterpart; the record was appended as a new inbound
    /// message.
    ///
    /// When the record carried a temporary id this is a reconciliation miss
    /// (local state was cleared, or the transport renamed the id): the user
    /// may see a duplicate message. Defined failure mode, worth a log line,
    /// never fatal.
    NewInbound,
}

/// Match an incoming server record to local state and merge or append.
///
/// `local_sender` derives ownership of new inbound entries.
pub fn reconcile(
    store: &mut MessageStore,
    record: ServerRecord,
    local_sender: &SenderId,
) -> MergeResult {
    let is_own = record.sender_id == *local_sender;

    let message = Message {
        id: Some(record.id),
        temp_id: record.temp_id,
        conversation_id: record.conversation_id,
        sender_id: record.sender_id,
        content: record.content,
        created_at: record.created_at,
        status: DeliveryStatus::Sent,
        is_own,
        is_deleted: false,
        is_edited: false,
        edited_at: None,
        read_by: Vec::new(),
    };

    match store.append(message) {
        AppendOutcome::Merged => MergeResult::Merged,
        AppendOutcome::DuplicateIgnored => MergeResult::DuplicateIgnored,
        AppendOutcome::Appended => MergeResult::NewInbound,
    }
}
