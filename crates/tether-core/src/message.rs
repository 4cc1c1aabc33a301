//! The message model.

use serde::{Deserialize, Serialize};

use crate::{
    ids::{ConversationId, MessageId, SenderId, TempId},
    status::DeliveryStatus,
};

/// Wall-clock milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// One reader's read record for a group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Identity that read the message.
    pub reader_id: SenderId,
    /// When the read was reported.
    pub read_at: TimestampMs,
}

/// One unit of communication.
///
/// Created optimistically by a local send (status `Pending`, permanent id
/// absent) or by an inbound server record (status `Sent` or higher, temporary
/// id absent). Never destroyed while its conversation references it; deletion
/// tombstones the entry instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Permanent identifier, assigned by the remote peer; `None` until
    /// confirmed.
    pub id: Option<MessageId>,
    /// Client-assigned identifier, present from creation until
    /// reconciliation. Never reused.
    pub temp_id: Option<TempId>,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Originating identity.
    pub sender_id: SenderId,
    /// Text body. Cleared when the message is tombstoned.
    pub content: String,
    /// Client wall-clock at creation, overwritten by the server timestamp on
    /// acknowledgment.
    pub created_at: TimestampMs,
    /// Delivery status.
    pub status: DeliveryStatus,
    /// Whether the local identity authored this message.
    pub is_own: bool,
    /// Tombstone flag; the entry stays in the conversation as a placeholder.
    pub is_deleted: bool,
    /// Whether the content was edited after sending.
    pub is_edited: bool,
    /// When the last edit happened.
    pub edited_at: Option<TimestampMs>,
    /// Reader records for group conversations. Append-only, never reduced.
    pub read_by: Vec<ReadReceipt>,
}

impl Message {
    /// Create an optimistic outgoing message in `Pending` state.
    pub fn outgoing(
        temp_id: TempId,
        conversation_id: ConversationId,
        sender_id: SenderId,
        content: impl Into<String>,
        created_at: TimestampMs,
    ) -> Self {
        Self {
            id: None,
            temp_id: Some(temp_id),
            conversation_id,
            sender_id,
            content: content.into(),
            created_at,
            status: DeliveryStatus::Pending,
            is_own: true,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
            read_by: Vec::new(),
        }
    }

    /// Apply a receipt-driven status transition. Returns `true` if the
    /// status changed.
    pub fn advance_status(&mut self, next: DeliveryStatus) -> bool {
        let advanced = self.status.advance(next);
        let changed = advanced != self.status;
        self.status = advanced;
        changed
    }

    /// Mark a send attempt as failed.
    pub fn mark_failed(&mut self) {
        self.status = DeliveryStatus::Failed;
    }

    /// Explicit user-initiated retry: `Failed → Pending`.
    ///
    /// Returns `false` (and leaves the message untouched) if the message is
    /// not in `Failed`.
    pub fn mark_retrying(&mut self) -> bool {
        if self.status == DeliveryStatus::Failed {
            self.status = DeliveryStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Tombstone the message: clear the content, keep the entry.
    pub fn tombstone(&mut self) {
        self.is_deleted = true;
        self.content.clear();
    }

    /// Replace the content via an explicit edit.
    pub fn apply_edit(&mut self, content: impl Into<String>, at: TimestampMs) {
        self.content = content.into();
        self.is_edited = true;
        self.edited_at = Some(at);
    }

    /// Append a reader record. Records are append-only; a repeated receipt
    /// from the same reader is ignored.
    pub fn record_reader(&mut self, receipt: ReadReceipt) -> bool {
        if self.read_by.iter().any(|r| r.reader_id == receipt.reader_id) {
            return false;
        }
        self.read_by.push(receipt);
        true
    }
}
