//! Client
//!
//! Sans-IO client state machine for offline-aware optimistic message
//! delivery. Manages per-conversation message state, reconciles optimistic
//! sends with server-confirmed records, and replays queued send-intents when
//! connectivity returns.
//!
//! # Architecture
//!
//! The client follows an action-based pattern: it receives events
//! ([`ClientEvent`]), processes them through pure state machine logic, and
//! returns actions ([`ClientAction`]) for the caller to execute. The caller
//! owns all I/O; the one ordering obligation is to resolve each
//! [`ClientAction::DispatchSend`] before expecting the next queued dispatch.
//!
//! # Components
//!
//! - [`Client`]: top-level state machine and UI binding surface
//! - [`ConnectivityObserver`]: duplicate-tolerant online/offline tracking
//! - [`PresenceRoster`] / [`TypingTracker`]: peer presence and typing state
//! - [`ClientEvent`] / [`ClientAction`]: the event and action vocabulary
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::Transport`]: the async boundary trait
//! - [`transport::ConnectedClient`]: a driver that executes dispatches
//!   serially over a transport

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod connectivity;
mod error;
mod event;
mod presence;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, LocalIdentity};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityObserver, Transition};
pub use error::ClientError;
pub use event::{AttemptId, ClientAction, ClientEvent, OutboundMessage, SendOutcome};
pub use presence::PresenceRoster;
pub use tether_core::{
    ConversationId, DeliveryStatus, Environment, Message, MessageId, MessageKey, QueueItemId,
    QueueItemStatus, QueuedItem, SenderId, ServerRecord, TempId,
};
pub use typing::TypingTracker;
