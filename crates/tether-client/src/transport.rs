//! Async transport driver for the client.
//!
//! Provides [`ConnectedClient`] which executes [`ClientAction::DispatchSend`]
//! actions over a [`Transport`] implementation. This is a thin layer that
//! just moves messages and events - delivery logic remains in the Sans-IO
//! [`Client`].
//!
//! The driver awaits each send attempt's outcome before feeding the
//! resolution back, so the client's next queued dispatch (if any) is only
//! produced after the previous one resolved. Queue ordering therefore holds
//! end to end without any locking.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::sync::mpsc;

use tether_core::{Environment, MessageId, TimestampMs};

use crate::{
    client::Client,
    error::ClientError,
    event::{ClientAction, ClientEvent, OutboundMessage, SendOutcome},
};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The peer rejected the message.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// What the authoritative peer returned for an accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Permanent id assigned by the peer.
    pub message_id: MessageId,
    /// Server-assigned timestamp.
    pub created_at: TimestampMs,
}

/// Async boundary to whatever wire the application speaks.
///
/// The core is protocol-agnostic: implementations may be a socket
/// connection, an HTTP client, or an in-memory fake for tests. The single
/// obligation is that [`send`](Transport::send) resolves exactly once per
/// call, with the peer's receipt or a failure.
pub trait Transport: Send {
    /// Deliver one message to the authoritative peer.
    fn send(
        &mut self,
        outbound: OutboundMessage,
    ) -> impl Future<Output = Result<SendReceipt, TransportError>> + Send;
}

/// Client wired to a transport.
///
/// Feed user intents and server notifications through
/// [`handle`](ConnectedClient::handle); inbound events pushed by the server
/// arrive on the channel passed at construction and are drained with
/// [`pump`](ConnectedClient::pump).
pub struct ConnectedClient<E: Environment, T: Transport> {
    client: Client<E>,
    transport: T,
    inbound: mpsc::Receiver<ClientEvent<E::Instant>>,
}

impl<E: Environment, T: Transport> ConnectedClient<E, T> {
    /// Wrap a client, a transport, and a channel of server-pushed events.
    pub fn new(
        client: Client<E>,
        transport: T,
        inbound: mpsc::Receiver<ClientEvent<E::Instant>>,
    ) -> Self {
        Self { client, transport, inbound }
    }

    /// Read-only access to the underlying client (UI binding surface).
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Process one event, executing every dispatch it (transitively)
    /// produces. Returns the non-dispatch actions for the caller's render
    /// layer.
    pub async fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut pending = self.client.handle(event)?;
        let mut surfaced = Vec::new();

        // Each resolution may produce the next queued dispatch; keep going
        // until the client stops asking for sends.
        while let Some(dispatch) = take_dispatch(&mut pending) {
            surfaced.append(&mut pending);

            let (attempt_id, outbound) = dispatch;
            let outcome = match self.transport.send(outbound).await {
                Ok(receipt) => SendOutcome::Accepted {
                    message_id: receipt.message_id,
                    created_at: receipt.created_at,
                },
                Err(error) => SendOutcome::Failed { reason: error.to_string() },
            };

            pending = self.client.handle(ClientEvent::SendResolved { attempt_id, outcome })?;
        }

        surfaced.append(&mut pending);
        Ok(surfaced)
    }

    /// Wait for the next server-pushed event and process it. Returns `None`
    /// when the server side of the channel closed.
    pub async fn pump(&mut self) -> Option<Result<Vec<ClientAction>, ClientError>> {
        let event = self.inbound.recv().await?;
        Some(self.handle(event).await)
    }
}

/// Remove and return the first dispatch from an action batch.
fn take_dispatch(
    actions: &mut Vec<ClientAction>,
) -> Option<(crate::event::AttemptId, OutboundMessage)> {
    let position = actions
        .iter()
        .position(|action| matches!(action, ClientAction::DispatchSend { .. }))?;
    match actions.remove(position) {
        ClientAction::DispatchSend { attempt_id, outbound } => Some((attempt_id, outbound)),
        _ => None,
    }
}

/// Production environment backed by system time and OS randomness.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn unix_time_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::rng().fill_bytes(buffer);
    }
}
