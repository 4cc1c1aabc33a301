//! FIFO queue of undelivered send-intents.
//!
//! The queue is pure bookkeeping: it tracks items, attempt counts and
//! statuses. Drain orchestration (when to dispatch, backoff, halting on a
//! failed head) lives in the client, which owns the connectivity picture.
//!
//! Invariants: strict insertion order; an item leaves the queue only on
//! acknowledged success, explicit cancellation, or a full clear.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    error::QueueError,
    ids::TempId,
    message::{Message, TimestampMs},
};

/// Queue-local identifier, monotonically assigned.
pub type QueueItemId = u64;

/// Kind of send-intent a queued item carries.
///
/// Messages are the only kind exercised today; the model admits future
/// kinds (e.g. scheduled sends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// A chat message awaiting (re)send.
    Message,
}

/// Processing state of a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    /// Waiting for its turn at the head of the queue.
    Pending,
    /// A send attempt is in flight.
    Processing,
    /// Retry budget exhausted; blocks the queue until the user retries or
    /// cancels.
    Failed,
}

/// An undelivered send-intent awaiting connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedItem {
    /// Queue-local identifier.
    pub id: QueueItemId,
    /// Kind of intent.
    pub kind: QueueKind,
    /// The message to (re)send.
    pub payload: Message,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempt budget; the item fails when `retry_count` reaches it.
    pub max_retries: u32,
    /// Processing state.
    pub status: QueueItemStatus,
    /// When the intent was queued, for ordering and display.
    pub created_at: TimestampMs,
}

/// FIFO collection of send-intents with bounded-retry bookkeeping.
#[derive(Debug, Default)]
pub struct OfflineQueue {
    items: VecDeque<QueuedItem>,
    next_id: QueueItemId,
}

impl OfflineQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queued items in FIFO order.
    pub fn items(&self) -> impl Iterator<Item = &QueuedItem> {
        self.items.iter()
    }

    /// The item that must be processed next, if any.
    pub fn head(&self) -> Option<&QueuedItem> {
        self.items.front()
    }

    /// Look up an item by id.
    pub fn get(&self, id: QueueItemId) -> Option<&QueuedItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Find the item whose payload carries `temp_id`.
    pub fn find_by_temp_id(&self, temp_id: TempId) -> Option<QueueItemId> {
        self.items.iter().find(|item| item.payload.temp_id == Some(temp_id)).map(|item| item.id)
    }

    /// Enqueue a fresh pending send-intent. Returns its queue-local id.
    pub fn enqueue(
        &mut self,
        payload: Message,
        max_retries: u32,
        created_at: TimestampMs,
    ) -> QueueItemId {
        self.push(payload, 0, max_retries, QueueItemStatus::Pending, created_at)
    }

    /// Park a send-intent whose attempt already failed.
    ///
    /// Used when an online direct send fails: the intent enters the queue in
    /// `Failed` state so the retry and cancel affordances are uniform with
    /// offline sends.
    pub fn park_failed(
        &mut self,
        payload: Message,
        attempts: u32,
        max_retries: u32,
        created_at: TimestampMs,
    ) -> QueueItemId {
        self.push(payload, attempts, max_retries, QueueItemStatus::Failed, created_at)
    }

    /// Mark the item `Processing` and return a clone of its payload for
    /// dispatch.
    ///
    /// # Errors
    ///
    /// [`QueueError::ItemNotPending`] if the item is already in flight or
    /// failed.
    pub fn begin_attempt(&mut self, id: QueueItemId) -> Result<Message, QueueError> {
        let item = self.get_mut(id)?;
        if item.status != QueueItemStatus::Pending {
            return Err(QueueError::ItemNotPending { id });
        }
        item.status = QueueItemStatus::Processing;
        Ok(item.payload.clone())
    }

    /// Remove an item whose send was acknowledged as successful.
    pub fn resolve_success(&mut self, id: QueueItemId) -> Result<QueuedItem, QueueError> {
        let position = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(QueueError::ItemNotFound { id })?;
        // remove() on a found position cannot return None
        self.items.remove(position).ok_or(QueueError::ItemNotFound { id })
    }

    /// Record a failed attempt.
    ///
    /// Increments `retry_count`; the item goes back to `Pending` while
    /// budget remains and to `Failed` once `retry_count` reaches
    /// `max_retries`. Returns the resulting status.
    pub fn resolve_failure(&mut self, id: QueueItemId) -> Result<QueueItemStatus, QueueError> {
        let item = self.get_mut(id)?;
        item.retry_count = item.retry_count.saturating_add(1);
        item.status = if item.retry_count >= item.max_retries {
            QueueItemStatus::Failed
        } else {
            QueueItemStatus::Pending
        };
        Ok(item.status)
    }

    /// Explicit user retry of a failed item: back to `Pending` with a fresh
    /// attempt budget.
    pub fn reset_for_retry(&mut self, id: QueueItemId) -> Result<(), QueueError> {
        let item = self.get_mut(id)?;
        if item.status == QueueItemStatus::Processing {
            return Err(QueueError::ItemInFlight { id });
        }
        item.retry_count = 0;
        item.status = QueueItemStatus::Pending;
        Ok(())
    }

    /// Cancel a queued item before it is dispatched.
    ///
    /// # Errors
    ///
    /// [`QueueError::ItemInFlight`] if an attempt is in flight; an issued
    /// send cannot be recalled, its result will still be applied.
    pub fn cancel(&mut self, id: QueueItemId) -> Result<QueuedItem, QueueError> {
        let position = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(QueueError::ItemNotFound { id })?;
        if self.items[position].status == QueueItemStatus::Processing {
            return Err(QueueError::ItemInFlight { id });
        }
        self.items.remove(position).ok_or(QueueError::ItemNotFound { id })
    }

    /// Drop all items. Session-lifecycle operation (logout).
    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn push(
        &mut self,
        payload: Message,
        retry_count: u32,
        max_retries: u32,
        status: QueueItemStatus,
        created_at: TimestampMs,
    ) -> QueueItemId {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push_back(QueuedItem {
            id,
            kind: QueueKind::Message,
            payload,
            retry_count,
            max_retries,
            status,
            created_at,
        });
        id
    }

    fn get_mut(&mut self, id: QueueItemId) -> Result<&mut QueuedItem, QueueError> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(QueueError::ItemNotFound { id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::{ConversationId, SenderId, TempIdAllocator};

    use super::*;

    fn payload(allocator: &mut TempIdAllocator, content: &str) -> Message {
        Message::outgoing(
            allocator.allocate(),
            ConversationId::from("conv-1"),
            SenderId::from("me"),
            content,
            10,
        )
    }

    #[test]
    fn items_keep_insertion_order() {
        let mut queue = OfflineQueue::new();
        let mut allocator = TempIdAllocator::new(1);
        let a = queue.enqueue(payload(&mut allocator, "a"), 3, 10);
        let b = queue.enqueue(payload(&mut allocator, "b"), 3, 11);
        let c = queue.enqueue(payload(&mut allocator, "c"), 3, 12);

        let order: Vec<QueueItemId> = queue.items().map(|item| item.id).collect();
        assert_eq!(order, [a, b, c]);
        assert_eq!(queue.head().map(|item| item.id), Some(a));
    }

    #[test]
    fn item_leaves_only_on_success_or_cancel() {
        let mut queue = OfflineQueue::new();
        let mut allocator = TempIdAllocator::new(1);
        let id = queue.enqueue(payload(&mut allocator, "a"), 3, 10);

        queue.begin_attempt(id).unwrap();
        assert_eq!(queue.resolve_failure(id).unwrap(), QueueItemStatus::Pending);
        assert_eq!(queue.len(), 1, "failed attempts never drop the item");

        queue.begin_attempt(id).unwrap();
        queue.resolve_success(id).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn retry_budget_exhaustion_marks_failed() {
        let mut queue = OfflineQueue::new();
        let mut allocator = TempIdAllocator::new(1);
        let id = queue.enqueue(payload(&mut allocator, "a"), 3, 10);

        for _ in 0..2 {
            queue.begin_attempt(id).unwrap();
            assert_eq!(queue.resolve_failure(id).unwrap(), QueueItemStatus::Pending);
        }
        queue.begin_attempt(id).unwrap();
        assert_eq!(queue.resolve_failure(id).unwrap(), QueueItemStatus::Failed);

        // Still present, but no longer dispatchable without a user reset.
        assert_eq!(queue.len(), 1);
        assert!(matches!(queue.begin_attempt(id), Err(QueueError::ItemNotPending { .. })));

        queue.reset_for_retry(id).unwrap();
        let item = queue.get(id).unwrap();
        assert_eq!(item.status, QueueItemStatus::Pending);
        assert_eq!(item.retry_count, 0);
    }

    #[test]
    fn cancel_refuses_in_flight_items() {
        let mut queue = OfflineQueue::new();
        let mut allocator = TempIdAllocator::new(1);
        let id = queue.enqueue(payload(&mut allocator, "a"), 3, 10);
        queue.begin_attempt(id).unwrap();

        assert!(matches!(queue.cancel(id), Err(QueueError::ItemInFlight { .. })));

        queue.resolve_failure(id).unwrap();
        assert!(queue.cancel(id).is_ok());
        assert!(queue.is_empty());
    }

    #[test]
    fn find_by_temp_id_links_message_to_item() {
        let mut queue = OfflineQueue::new();
        let mut allocator = TempIdAllocator::new(1);
        let message = payload(&mut allocator, "a");
        let temp_id = message.temp_id.unwrap();
        let id = queue.enqueue(message, 3, 10);

        assert_eq!(queue.find_by_temp_id(temp_id), Some(id));
        assert_eq!(queue.find_by_temp_id(allocator.allocate()), None);
    }
}
