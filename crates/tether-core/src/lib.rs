//! Core data model for offline-aware optimistic message delivery.
//!
//! Pure state machines with no I/O dependencies: every type in this crate is
//! driven by discrete inputs and can be tested deterministically. The
//! orchestrating client lives in `tether-client`.
//!
//! # Components
//!
//! - [`TempIdAllocator`]: session-unique temporary identifiers for
//!   not-yet-confirmed messages
//! - [`DeliveryStatus`]: per-message delivery state with advance-only
//!   transitions
//! - [`MessageStore`]: per-conversation ordered collections with
//!   dedup-on-append and merge-by-temporary-id
//! - [`reconcile`]: matches server-confirmed records to pending local
//!   messages
//! - [`OfflineQueue`]: FIFO send-intent bookkeeping with bounded retries
//! - [`Environment`]: time and randomness injection for deterministic tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod ids;
mod message;
mod queue;
mod reconcile;
mod status;
mod store;

pub use env::Environment;
pub use error::{QueueError, StoreError};
pub use ids::{ConversationId, MessageId, SenderId, TempId, TempIdAllocator};
pub use message::{Message, ReadReceipt, TimestampMs};
pub use queue::{OfflineQueue, QueueItemId, QueueItemStatus, QueueKind, QueuedItem};
pub use reconcile::{MergeResult, ServerRecord, reconcile};
pub use status::DeliveryStatus;
pub use store::{AppendOutcome, MessageKey, MessageStore};
