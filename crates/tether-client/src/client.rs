//! Client state machine.
//!
//! The [`Client`] is the top-level state machine that wires the identity
//! allocator, message store, reconciler, offline queue and connectivity
//! observer together. It receives [`ClientEvent`]s, mutates state, and
//! returns [`ClientAction`]s for the caller to execute - it performs no I/O
//! itself.
//!
//! # Draining
//!
//! Queue draining is serialized structurally: at most one queue-driven
//! [`ClientAction::DispatchSend`] is outstanding at any time, and the next
//! one is only produced after the previous attempt's
//! [`ClientEvent::SendResolved`] arrives. Send order therefore matches user
//! intent order within a conversation. A failed head blocks the queue until
//! the user retries or cancels it.

use std::collections::HashMap;

use tether_core::{
    ConversationId, DeliveryStatus, Environment, MergeResult, Message, MessageId, MessageKey,
    MessageStore, OfflineQueue, QueueItemId, QueueItemStatus, QueuedItem, ReadReceipt, SenderId,
    ServerRecord, TempId, TempIdAllocator, TimestampMs, reconcile,
};

use crate::{
    config::ClientConfig,
    connectivity::{ConnectivityObserver, Transition},
    error::ClientError,
    event::{AttemptId, ClientAction, ClientEvent, OutboundMessage, SendOutcome},
    presence::PresenceRoster,
    typing::TypingTracker,
};

/// The local identity, supplied by the auth subsystem.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    /// Sender id this client writes into outgoing messages.
    pub sender_id: SenderId,
}

impl LocalIdentity {
    /// Create a local identity.
    pub fn new(sender_id: impl Into<SenderId>) -> Self {
        Self { sender_id: sender_id.into() }
    }
}

/// A send attempt issued to the transport and not yet resolved.
struct InFlightSend<I> {
    temp_id: TempId,
    conversation_id: ConversationId,
    /// `Some` for queue-driven attempts, `None` for direct online sends.
    item_id: Option<QueueItemId>,
    started_at: I,
    /// The attempt exceeded the send timeout; failure bookkeeping already
    /// ran, but a late resolution is still applied when it arrives.
    timed_out: bool,
}

/// Drain progress. `Idle` covers both "nothing to do" and "halted on a
/// failed head".
#[derive(Clone, Copy)]
enum DrainState<I> {
    Idle,
    /// Waiting for the transport to resolve the head item's attempt.
    AwaitingResolution { item_id: QueueItemId },
    /// The head item failed with budget remaining; re-attempt at
    /// `resume_at`.
    Backoff { item_id: QueueItemId, resume_at: I },
}

/// Sans-IO client for offline-aware optimistic message delivery.
///
/// Plainly owned with a defined lifecycle: construct at session start,
/// [`reset`](Client::reset) on logout. All reads the UI needs go through the
/// accessor methods; all writes go through [`handle`](Client::handle).
pub struct Client<E: Environment> {
    env: E,
    identity: LocalIdentity,
    config: ClientConfig,
    allocator: TempIdAllocator,
    store: MessageStore,
    queue: OfflineQueue,
    connectivity: ConnectivityObserver,
    presence: PresenceRoster,
    typing: TypingTracker<E::Instant>,
    drain: DrainState<E::Instant>,
    in_flight: HashMap<AttemptId, InFlightSend<E::Instant>>,
    next_attempt_id: AttemptId,
}

impl<E: Environment> Client<E> {
    /// Create a client with the given identity and configuration.
    ///
    /// Starts online; feed a [`ClientEvent::ConnectivityChanged`] if the
    /// environment says otherwise.
    pub fn new(env: E, identity: LocalIdentity, config: ClientConfig) -> Self {
        let session_nonce = env.random_u64();
        Self {
            env,
            identity,
            config,
            allocator: TempIdAllocator::new(session_nonce),
            store: MessageStore::new(),
            queue: OfflineQueue::new(),
            connectivity: ConnectivityObserver::new(true),
            presence: PresenceRoster::new(),
            typing: TypingTracker::new(),
            drain: DrainState::Idle,
            in_flight: HashMap::new(),
            next_attempt_id: 0,
        }
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::SendMessage { conversation_id, content } => {
                self.handle_send_message(conversation_id, content)
            },
            ClientEvent::RetryMessage { conversation_id, key } => {
                self.handle_retry(conversation_id, &key)
            },
            ClientEvent::CancelQueued { item_id } => self.handle_cancel(item_id),
            ClientEvent::EditMessage { conversation_id, key, content } => {
                self.handle_edit(&conversation_id, &key, content)
            },
            ClientEvent::MessageReceived(record) => self.handle_message_received(record),
            ClientEvent::MessageAcknowledged {
                conversation_id,
                temp_id,
                message_id,
                created_at,
            } => self.handle_acknowledged(&conversation_id, temp_id, message_id, created_at),
            ClientEvent::MessageDelivered { conversation_id, message_id } => {
                self.handle_delivered(&conversation_id, message_id)
            },
            ClientEvent::MessagesRead { conversation_id, message_ids, reader } => {
                self.handle_read(&conversation_id, &message_ids, reader)
            },
            ClientEvent::MessageDeleted { conversation_id, message_id } => {
                self.handle_deleted(&conversation_id, &message_id)
            },
            ClientEvent::SendResolved { attempt_id, outcome } => {
                self.handle_send_resolved(attempt_id, outcome)
            },
            ClientEvent::ConnectivityChanged { online } => self.handle_connectivity(online),
            ClientEvent::PeerOnline { user_id } => {
                let changed = self.presence.mark_online(user_id);
                Ok(Self::presence_actions(changed))
            },
            ClientEvent::PeerOffline { user_id } => {
                let changed = self.presence.mark_offline(&user_id);
                Ok(Self::presence_actions(changed))
            },
            ClientEvent::PresenceSnapshot { user_ids } => {
                let changed = self.presence.set_all(user_ids);
                Ok(Self::presence_actions(changed))
            },
            ClientEvent::TypingStarted { conversation_id, user_id } => {
                Ok(self.handle_typing_started(conversation_id, user_id))
            },
            ClientEvent::TypingStopped { conversation_id, user_id } => {
                let changed = self.typing.stopped(&conversation_id, &user_id);
                Ok(if changed {
                    vec![ClientAction::TypingChanged { conversation_id }]
                } else {
                    vec![]
                })
            },
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
        }
    }

    // === UI binding: read-only views ===

    /// Sender id of the local identity.
    pub fn sender_id(&self) -> &SenderId {
        &self.identity.sender_id
    }

    /// Messages of a conversation in display order.
    pub fn messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.store.messages(conversation_id)
    }

    /// Conversations that currently hold messages.
    pub fn conversations(&self) -> impl Iterator<Item = &ConversationId> {
        self.store.conversations()
    }

    /// Queued send-intents in FIFO order.
    pub fn queue_items(&self) -> impl Iterator<Item = &QueuedItem> {
        self.queue.items()
    }

    /// Current connectivity state.
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Whether a drain is in progress (an attempt in flight or backoff
    /// pending).
    pub fn is_draining(&self) -> bool {
        !matches!(self.drain, DrainState::Idle)
    }

    /// Peers currently reported online.
    pub fn online_peers(&self) -> impl Iterator<Item = &SenderId> {
        self.presence.online_peers()
    }

    /// Peers currently typing in a conversation.
    pub fn typing_peers(&self, conversation_id: &ConversationId) -> Vec<&SenderId> {
        self.typing.typing_peers(conversation_id)
    }

    /// Drop all session state (logout). Connectivity is an environment fact
    /// and survives the reset.
    pub fn reset(&mut self) {
        self.store.reset();
        self.queue.clear();
        self.presence.clear();
        self.typing.clear();
        self.in_flight.clear();
        self.drain = DrainState::Idle;
    }

    // === Event handlers ===

    fn handle_send_message(
        &mut self,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let temp_id = self.allocator.allocate();
        let message = Message::outgoing(
            temp_id,
            conversation_id.clone(),
            self.identity.sender_id.clone(),
            content,
            self.env.unix_time_ms(),
        );

        let mut actions = Vec::new();
        self.store.append(message.clone());
        actions.push(ClientAction::MessagesChanged { conversation_id });

        if self.connectivity.is_online() && self.queue.is_empty() {
            // Direct attempt; only failures enter the queue.
            self.dispatch(message, None, &mut actions);
        } else {
            // Behind earlier intents, or offline: queue preserves order.
            self.queue.enqueue(message, self.config.max_retries, self.env.unix_time_ms());
            actions.push(ClientAction::QueueChanged);
            self.advance_drain(&mut actions);
        }

        Ok(actions)
    }

    fn handle_retry(
        &mut self,
        conversation_id: ConversationId,
        key: &MessageKey,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.store.mark_retrying(&conversation_id, key)? {
            return Err(ClientError::RetryNotFailed { conversation_id, key: key.clone() });
        }

        let mut actions = vec![ClientAction::MessagesChanged {
            conversation_id: conversation_id.clone(),
        }];

        let temp_id = self
            .store
            .find(&conversation_id, key)
            .and_then(|message| message.temp_id);

        if let Some(temp_id) = temp_id {
            match self.queue.find_by_temp_id(temp_id) {
                Some(item_id) => {
                    self.queue.reset_for_retry(item_id)?;
                },
                None => {
                    // No parked intent (e.g. restored session state):
                    // re-queue from the stored message.
                    if let Some(message) = self.store.find(&conversation_id, key).cloned() {
                        self.queue.enqueue(
                            message,
                            self.config.max_retries,
                            self.env.unix_time_ms(),
                        );
                    }
                },
            }
            actions.push(ClientAction::QueueChanged);
        }

        self.advance_drain(&mut actions);
        Ok(actions)
    }

    fn handle_cancel(&mut self, item_id: QueueItemId) -> Result<Vec<ClientAction>, ClientError> {
        let item = self.queue.cancel(item_id)?;
        let mut actions = vec![ClientAction::QueueChanged];

        // The optimistic message stays visible; fail it so the retry
        // affordance remains.
        if let Some(temp_id) = item.payload.temp_id {
            let conversation_id = item.payload.conversation_id.clone();
            let key = MessageKey::Temporary(temp_id);
            if let Some(message) = self.store.find(&conversation_id, &key)
                && !message.status.is_at_least(DeliveryStatus::Sent)
            {
                let _ = self.store.mark_failed(&conversation_id, &key);
                actions.push(ClientAction::MessagesChanged { conversation_id });
            }
        }

        self.clear_drain_if(item_id);
        self.advance_drain(&mut actions);
        Ok(actions)
    }

    fn handle_edit(
        &mut self,
        conversation_id: &ConversationId,
        key: &MessageKey,
        content: String,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.store.edit(conversation_id, key, content, self.env.unix_time_ms())?;
        Ok(vec![ClientAction::MessagesChanged { conversation_id: conversation_id.clone() }])
    }

    fn handle_message_received(
        &mut self,
        record: ServerRecord,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let conversation_id = record.conversation_id.clone();
        let echoed_temp_id = record.temp_id;

        match reconcile(&mut self.store, record, &self.identity.sender_id) {
            MergeResult::Merged => {
                let mut actions = vec![ClientAction::MessagesChanged { conversation_id }];
                // The echo confirms the send even if the explicit
                // acknowledgment was lost.
                if let Some(temp_id) = echoed_temp_id {
                    self.settle_queued_send(temp_id, &mut actions);
                }
                Ok(actions)
            },
            MergeResult::DuplicateIgnored => {
                tracing::debug!(conversation = %conversation_id, "duplicate delivery absorbed");
                Ok(vec![])
            },
            MergeResult::NewInbound => {
                if echoed_temp_id.is_some() {
                    tracing::warn!(
                        conversation = %conversation_id,
                        "record echoed a temporary id with no local counterpart; \
                         appended as new (possible visible duplicate)"
                    );
                }
                Ok(vec![ClientAction::MessagesChanged { conversation_id }])
            },
        }
    }

    fn handle_acknowledged(
        &mut self,
        conversation_id: &ConversationId,
        temp_id: TempId,
        message_id: MessageId,
        created_at: TimestampMs,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut actions = Vec::new();

        if self.store.acknowledge(conversation_id, temp_id, message_id, created_at) {
            actions.push(ClientAction::MessagesChanged {
                conversation_id: conversation_id.clone(),
            });
        } else {
            tracing::debug!(
                conversation = %conversation_id,
                temp_id = %temp_id,
                "acknowledgment without a pending counterpart"
            );
        }

        // The server push supersedes the transport resolution for this
        // attempt, if one is still pending.
        let resolved: Vec<AttemptId> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.temp_id == temp_id)
            .map(|(id, _)| *id)
            .collect();
        for attempt_id in resolved {
            self.in_flight.remove(&attempt_id);
        }

        self.settle_queued_send(temp_id, &mut actions);
        Ok(actions)
    }

    fn handle_delivered(
        &mut self,
        conversation_id: &ConversationId,
        message_id: MessageId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let key = MessageKey::Permanent(message_id);
        match self.store.update_status(conversation_id, &key, DeliveryStatus::Delivered) {
            Ok(true) => Ok(vec![ClientAction::MessagesChanged {
                conversation_id: conversation_id.clone(),
            }]),
            Ok(false) => Ok(vec![]),
            Err(error) => {
                // Receipts can outlive local state across reconnects.
                tracing::debug!(%error, "delivery receipt for unknown message");
                Ok(vec![])
            },
        }
    }

    fn handle_read(
        &mut self,
        conversation_id: &ConversationId,
        message_ids: &[MessageId],
        reader: Option<ReadReceipt>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut changed = false;

        for message_id in message_ids {
            let key = MessageKey::Permanent(message_id.clone());
            match self.store.update_status(conversation_id, &key, DeliveryStatus::Read) {
                Ok(did_change) => changed |= did_change,
                Err(error) => {
                    tracing::debug!(%error, "read receipt for unknown message");
                    continue;
                },
            }
            if let Some(receipt) = reader.clone() {
                changed |= self
                    .store
                    .record_reader(conversation_id, message_id, receipt)
                    .unwrap_or(false);
            }
        }

        Ok(if changed {
            vec![ClientAction::MessagesChanged { conversation_id: conversation_id.clone() }]
        } else {
            vec![]
        })
    }

    fn handle_deleted(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match self.store.mark_deleted(conversation_id, message_id) {
            Ok(()) => Ok(vec![ClientAction::MessagesChanged {
                conversation_id: conversation_id.clone(),
            }]),
            Err(error) => {
                tracing::debug!(%error, "delete for unknown message");
                Ok(vec![])
            },
        }
    }

    fn handle_send_resolved(
        &mut self,
        attempt_id: AttemptId,
        outcome: SendOutcome,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let flight = self
            .in_flight
            .remove(&attempt_id)
            .ok_or(ClientError::UnknownAttempt { attempt_id })?;

        let mut actions = Vec::new();

        match outcome {
            SendOutcome::Accepted { message_id, created_at } => {
                if self.store.acknowledge(
                    &flight.conversation_id,
                    flight.temp_id,
                    message_id,
                    created_at,
                ) {
                    actions.push(ClientAction::MessagesChanged {
                        conversation_id: flight.conversation_id.clone(),
                    });
                } else {
                    tracing::debug!(
                        temp_id = %flight.temp_id,
                        "send resolution without a pending counterpart"
                    );
                }
                self.settle_queued_send(flight.temp_id, &mut actions);
            },
            SendOutcome::Failed { reason } => {
                tracing::warn!(temp_id = %flight.temp_id, %reason, "send attempt failed");
                if !flight.timed_out {
                    self.apply_send_failure(&flight, &mut actions);
                }
                // Timed-out attempts already ran failure bookkeeping.
            },
        }

        Ok(actions)
    }

    fn handle_connectivity(&mut self, online: bool) -> Result<Vec<ClientAction>, ClientError> {
        match self.connectivity.observe(online) {
            None => Ok(vec![]),
            Some(Transition::WentOffline) => {
                tracing::debug!("connectivity lost; drain suspended");
                // In-flight attempts keep running; their resolutions are
                // applied but do not trigger the next drain step.
                self.drain = DrainState::Idle;
                Ok(vec![])
            },
            Some(Transition::WentOnline) => {
                tracing::debug!(queued = self.queue.len(), "connectivity restored");
                let mut actions = Vec::new();
                self.advance_drain(&mut actions);
                Ok(actions)
            },
        }
    }

    fn handle_typing_started(
        &mut self,
        conversation_id: ConversationId,
        user_id: SenderId,
    ) -> Vec<ClientAction> {
        let expires_at = self.env.now() + self.config.typing_ttl;
        if self.typing.started(conversation_id.clone(), user_id, expires_at) {
            vec![ClientAction::TypingChanged { conversation_id }]
        } else {
            vec![]
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let mut actions = Vec::new();

        for conversation_id in self.typing.expire(now) {
            actions.push(ClientAction::TypingChanged { conversation_id });
        }

        // Force unresolved sends to Failed after the configured timeout.
        // The attempt itself may still complete; its late resolution is
        // applied when (and if) it arrives.
        let expired: Vec<AttemptId> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| {
                !flight.timed_out && now - flight.started_at >= self.config.send_timeout
            })
            .map(|(id, _)| *id)
            .collect();

        for attempt_id in expired {
            let Some(flight) = self.in_flight.get_mut(&attempt_id) else { continue };
            flight.timed_out = true;
            let snapshot = InFlightSend {
                temp_id: flight.temp_id,
                conversation_id: flight.conversation_id.clone(),
                item_id: flight.item_id,
                started_at: flight.started_at,
                timed_out: true,
            };
            tracing::warn!(temp_id = %snapshot.temp_id, "send attempt timed out");
            self.apply_send_failure(&snapshot, &mut actions);
        }

        // Resume a backed-off queue item whose delay has elapsed.
        if let DrainState::Backoff { item_id: _, resume_at } = self.drain
            && now >= resume_at
        {
            self.drain = DrainState::Idle;
            self.advance_drain(&mut actions);
        }

        actions
    }

    // === Drain orchestration ===

    /// Start the next queue dispatch if nothing is in the way.
    ///
    /// Produces at most one `DispatchSend`; subsequent items wait for the
    /// resolution event. Reentrant-safe: a drain already awaiting a
    /// resolution or a backoff deadline is left alone.
    fn advance_drain(&mut self, actions: &mut Vec<ClientAction>) {
        if !self.connectivity.is_online() {
            self.drain = DrainState::Idle;
            return;
        }

        match self.drain {
            DrainState::AwaitingResolution { item_id } | DrainState::Backoff { item_id, .. } => {
                if self.queue.get(item_id).is_some() {
                    return;
                }
                // The referenced item is gone (late success or cancel).
                self.drain = DrainState::Idle;
            },
            DrainState::Idle => {},
        }

        let Some(head) = self.queue.head() else { return };
        if head.status != QueueItemStatus::Pending {
            // Failed head blocks the queue; an orphaned Processing head
            // waits for its timeout.
            return;
        }

        let item_id = head.id;
        let Ok(message) = self.queue.begin_attempt(item_id) else { return };
        self.drain = DrainState::AwaitingResolution { item_id };
        self.dispatch(message, Some(item_id), actions);
    }

    /// Register an attempt and emit its `DispatchSend`.
    fn dispatch(
        &mut self,
        message: Message,
        item_id: Option<QueueItemId>,
        actions: &mut Vec<ClientAction>,
    ) {
        let Some(temp_id) = message.temp_id else {
            // Outgoing payloads always carry a temporary id; anything else
            // is a construction defect.
            debug_assert!(false, "dispatch of a payload without a temporary id");
            return;
        };

        let attempt_id = self.next_attempt_id;
        self.next_attempt_id += 1;

        self.in_flight.insert(attempt_id, InFlightSend {
            temp_id,
            conversation_id: message.conversation_id.clone(),
            item_id,
            started_at: self.env.now(),
            timed_out: false,
        });

        actions.push(ClientAction::DispatchSend {
            attempt_id,
            outbound: OutboundMessage {
                temp_id,
                conversation_id: message.conversation_id,
                content: message.content,
            },
        });
    }

    /// A send for `temp_id` was confirmed: drop its queued intent (if any)
    /// and move the drain along.
    fn settle_queued_send(&mut self, temp_id: TempId, actions: &mut Vec<ClientAction>) {
        if let Some(item_id) = self.queue.find_by_temp_id(temp_id) {
            if self.queue.resolve_success(item_id).is_ok() {
                actions.push(ClientAction::QueueChanged);
            }
            self.clear_drain_if(item_id);
        }
        self.advance_drain(actions);
    }

    /// Failure bookkeeping shared by transport failures and send timeouts.
    fn apply_send_failure(
        &mut self,
        flight: &InFlightSend<E::Instant>,
        actions: &mut Vec<ClientAction>,
    ) {
        let key = MessageKey::Temporary(flight.temp_id);

        match flight.item_id {
            None => {
                // Direct online send: fail the message and park the intent
                // so retry and cancel work the same as for offline sends.
                if self.store.mark_failed(&flight.conversation_id, &key).is_ok() {
                    actions.push(ClientAction::MessagesChanged {
                        conversation_id: flight.conversation_id.clone(),
                    });
                }
                if let Some(message) = self.store.find(&flight.conversation_id, &key).cloned() {
                    self.queue.park_failed(
                        message,
                        1,
                        self.config.max_retries,
                        self.env.unix_time_ms(),
                    );
                    actions.push(ClientAction::QueueChanged);
                }
            },
            Some(item_id) => {
                match self.queue.resolve_failure(item_id) {
                    Ok(QueueItemStatus::Failed) => {
                        // Budget exhausted: surface the failure and halt the
                        // drain on this item.
                        if self.store.mark_failed(&flight.conversation_id, &key).is_ok() {
                            actions.push(ClientAction::MessagesChanged {
                                conversation_id: flight.conversation_id.clone(),
                            });
                        }
                        actions.push(ClientAction::QueueChanged);
                        self.clear_drain_if(item_id);
                    },
                    Ok(_) => {
                        actions.push(ClientAction::QueueChanged);
                        if self.connectivity.is_online()
                            && matches!(
                                self.drain,
                                DrainState::AwaitingResolution { item_id: awaited }
                                    if awaited == item_id
                            )
                        {
                            self.drain = DrainState::Backoff {
                                item_id,
                                resume_at: self.env.now() + self.config.retry_delay,
                            };
                        } else {
                            self.clear_drain_if(item_id);
                        }
                    },
                    Err(error) => {
                        tracing::warn!(%error, "failure resolution for missing queue item");
                    },
                }
            },
        }
    }

    fn clear_drain_if(&mut self, item_id: QueueItemId) {
        match self.drain {
            DrainState::AwaitingResolution { item_id: current }
            | DrainState::Backoff { item_id: current, .. }
                if current == item_id =>
            {
                self.drain = DrainState::Idle;
            },
            _ => {},
        }
    }

    fn presence_actions(changed: bool) -> Vec<ClientAction> {
        if changed { vec![ClientAction::PresenceChanged] } else { vec![] }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tether_core::env::test_utils::MockEnv;

    use super::*;

    fn conv() -> ConversationId {
        ConversationId::from("conv-1")
    }

    fn client() -> (Client<MockEnv>, MockEnv) {
        let env = MockEnv::new();
        let client = Client::new(env.clone(), LocalIdentity::new("me"), ClientConfig::default());
        (client, env)
    }

    fn send(client: &mut Client<MockEnv>, content: &str) -> Vec<ClientAction> {
        client
            .handle(ClientEvent::SendMessage {
                conversation_id: conv(),
                content: content.to_owned(),
            })
            .unwrap()
    }

    fn dispatched(actions: &[ClientAction]) -> Vec<(AttemptId, OutboundMessage)> {
        actions
            .iter()
            .filter_map(|action| match action {
                ClientAction::DispatchSend { attempt_id, outbound } => {
                    Some((*attempt_id, outbound.clone()))
                },
                _ => None,
            })
            .collect()
    }

    fn resolve_ok(
        client: &mut Client<MockEnv>,
        attempt_id: AttemptId,
        message_id: &str,
    ) -> Vec<ClientAction> {
        client
            .handle(ClientEvent::SendResolved {
                attempt_id,
                outcome: SendOutcome::Accepted {
                    message_id: MessageId::from(message_id),
                    created_at: 9_000,
                },
            })
            .unwrap()
    }

    fn resolve_err(client: &mut Client<MockEnv>, attempt_id: AttemptId) -> Vec<ClientAction> {
        client
            .handle(ClientEvent::SendResolved {
                attempt_id,
                outcome: SendOutcome::Failed { reason: "connection reset".to_owned() },
            })
            .unwrap()
    }

    fn go(client: &mut Client<MockEnv>, online: bool) -> Vec<ClientAction> {
        client.handle(ClientEvent::ConnectivityChanged { online }).unwrap()
    }

    fn statuses(client: &Client<MockEnv>) -> Vec<DeliveryStatus> {
        client.messages(&conv()).iter().map(|m| m.status).collect()
    }

    #[test]
    fn online_send_walks_the_full_status_ladder() {
        let (mut client, _env) = client();

        let actions = send(&mut client, "hi");
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(statuses(&client), [DeliveryStatus::Pending]);
        assert!(client.queue_items().next().is_none(), "online sends bypass the queue");

        resolve_ok(&mut client, dispatches[0].0, "msg-1");
        assert_eq!(statuses(&client), [DeliveryStatus::Sent]);
        let message = &client.messages(&conv())[0];
        assert_eq!(message.id, Some(MessageId::from("msg-1")));
        assert_eq!(message.temp_id, None);
        assert_eq!(message.created_at, 9_000, "server timestamp overwrites the client's");

        client
            .handle(ClientEvent::MessageDelivered {
                conversation_id: conv(),
                message_id: MessageId::from("msg-1"),
            })
            .unwrap();
        assert_eq!(statuses(&client), [DeliveryStatus::Delivered]);

        client
            .handle(ClientEvent::MessagesRead {
                conversation_id: conv(),
                message_ids: vec![MessageId::from("msg-1")],
                reader: None,
            })
            .unwrap();
        assert_eq!(statuses(&client), [DeliveryStatus::Read]);
    }

    #[test]
    fn receipts_never_regress_status() {
        let (mut client, _env) = client();
        let actions = send(&mut client, "hi");
        resolve_ok(&mut client, dispatched(&actions)[0].0, "msg-1");

        client
            .handle(ClientEvent::MessagesRead {
                conversation_id: conv(),
                message_ids: vec![MessageId::from("msg-1")],
                reader: None,
            })
            .unwrap();
        // Stale delivery receipt after the read receipt.
        client
            .handle(ClientEvent::MessageDelivered {
                conversation_id: conv(),
                message_id: MessageId::from("msg-1"),
            })
            .unwrap();

        assert_eq!(statuses(&client), [DeliveryStatus::Read]);
    }

    #[test]
    fn offline_send_queues_and_drains_on_reconnect() {
        let (mut client, _env) = client();
        go(&mut client, false);

        let actions = send(&mut client, "hi");
        assert!(dispatched(&actions).is_empty());
        assert_eq!(statuses(&client), [DeliveryStatus::Pending]);
        assert_eq!(client.queue_items().count(), 1);

        let actions = go(&mut client, true);
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches.len(), 1);
        assert!(client.is_draining());

        resolve_ok(&mut client, dispatches[0].0, "msg-1");
        assert_eq!(statuses(&client), [DeliveryStatus::Sent]);
        assert_eq!(client.queue_items().count(), 0);
        assert!(!client.is_draining());
    }

    #[test]
    fn duplicate_inbound_records_collapse_to_one_message() {
        let (mut client, _env) = client();
        let record = ServerRecord {
            id: MessageId::from("msg-42"),
            temp_id: None,
            conversation_id: conv(),
            sender_id: SenderId::from("user-2"),
            content: "hello".to_owned(),
            created_at: 100,
        };

        client.handle(ClientEvent::MessageReceived(record.clone())).unwrap();
        client.handle(ClientEvent::MessageReceived(record)).unwrap();

        assert_eq!(client.messages(&conv()).len(), 1);
        assert!(!client.messages(&conv())[0].is_own);
    }

    #[test]
    fn drain_is_fifo_and_serial() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "a");
        send(&mut client, "b");
        send(&mut client, "c");

        let actions = go(&mut client, true);
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches.len(), 1, "later items wait for the head to resolve");
        assert_eq!(dispatches[0].1.content, "a");

        let actions = resolve_ok(&mut client, dispatches[0].0, "msg-a");
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].1.content, "b");

        let actions = resolve_ok(&mut client, dispatches[0].0, "msg-b");
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches[0].1.content, "c");

        resolve_ok(&mut client, dispatches[0].0, "msg-c");
        assert_eq!(client.queue_items().count(), 0);
        let contents: Vec<&str> =
            client.messages(&conv()).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[test]
    fn duplicate_online_notifications_do_not_double_drain() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "a");

        let first = go(&mut client, true);
        assert_eq!(dispatched(&first).len(), 1);

        let second = go(&mut client, true);
        assert!(second.is_empty(), "repeated online notification while draining is a no-op");
    }

    #[test]
    fn retry_budget_exhaustion_halts_the_drain() {
        let (mut client, env) = client();
        go(&mut client, false);
        send(&mut client, "a");
        send(&mut client, "b");

        let mut actions = go(&mut client, true);
        for _ in 0..3 {
            let dispatches = dispatched(&actions);
            assert_eq!(dispatches.len(), 1);
            assert_eq!(dispatches[0].1.content, "a");
            actions = resolve_err(&mut client, dispatches[0].0);
            // Backed-off re-attempts only run after the delay elapses.
            env.advance(Duration::from_secs(3));
            let tick = client.handle(ClientEvent::Tick { now: env.now() }).unwrap();
            actions.extend(tick);
        }

        let item = client.queue_items().next().unwrap();
        assert_eq!(item.status, QueueItemStatus::Failed);
        assert_eq!(item.retry_count, 3);
        assert_eq!(client.queue_items().count(), 2, "the failed head blocks the queue");
        assert!(dispatched(&actions).is_empty(), "no attempt for b while a is failed");
        assert!(!client.is_draining());
        assert_eq!(statuses(&client)[0], DeliveryStatus::Failed);
    }

    #[test]
    fn user_retry_resets_the_failed_head_and_resumes() {
        let (mut client, env) = client();
        go(&mut client, false);
        send(&mut client, "a");

        let mut actions = go(&mut client, true);
        for _ in 0..3 {
            let dispatches = dispatched(&actions);
            actions = resolve_err(&mut client, dispatches[0].0);
            env.advance(Duration::from_secs(3));
            actions.extend(client.handle(ClientEvent::Tick { now: env.now() }).unwrap());
        }
        assert_eq!(statuses(&client), [DeliveryStatus::Failed]);

        let temp_id = client.messages(&conv())[0].temp_id.unwrap();
        let actions = client
            .handle(ClientEvent::RetryMessage {
                conversation_id: conv(),
                key: MessageKey::Temporary(temp_id),
            })
            .unwrap();

        assert_eq!(statuses(&client), [DeliveryStatus::Pending]);
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches.len(), 1);
        let item = client.queue_items().next().unwrap();
        assert_eq!(item.retry_count, 0, "user retry grants a fresh budget");

        resolve_ok(&mut client, dispatches[0].0, "msg-a");
        assert_eq!(statuses(&client), [DeliveryStatus::Sent]);
        assert!(client.queue_items().next().is_none());
    }

    #[test]
    fn retrying_a_non_failed_message_is_an_error() {
        let (mut client, _env) = client();
        let actions = send(&mut client, "hi");
        let temp_id = dispatched(&actions)[0].1.temp_id;

        let result = client.handle(ClientEvent::RetryMessage {
            conversation_id: conv(),
            key: MessageKey::Temporary(temp_id),
        });

        assert!(matches!(result, Err(ClientError::RetryNotFailed { .. })));
    }

    #[test]
    fn going_offline_mid_drain_stops_after_the_inflight_item() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "a");
        send(&mut client, "b");

        let actions = go(&mut client, true);
        let dispatches = dispatched(&actions);
        assert_eq!(dispatches[0].1.content, "a");

        go(&mut client, false);

        // The in-flight attempt still resolves and is applied...
        let actions = resolve_ok(&mut client, dispatches[0].0, "msg-a");
        assert_eq!(statuses(&client)[0], DeliveryStatus::Sent);
        // ...but must not trigger the next drain step.
        assert!(dispatched(&actions).is_empty());
        assert_eq!(client.queue_items().count(), 1);

        let actions = go(&mut client, true);
        assert_eq!(dispatched(&actions)[0].1.content, "b");
    }

    #[test]
    fn direct_send_failure_parks_a_failed_item() {
        let (mut client, _env) = client();
        let actions = send(&mut client, "hi");
        let dispatches = dispatched(&actions);

        resolve_err(&mut client, dispatches[0].0);

        assert_eq!(statuses(&client), [DeliveryStatus::Failed]);
        let item = client.queue_items().next().unwrap();
        assert_eq!(item.status, QueueItemStatus::Failed);
        assert_eq!(item.retry_count, 1);
    }

    #[test]
    fn cancel_removes_the_item_and_fails_the_message() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "hi");

        let item_id = client.queue_items().next().unwrap().id;
        client.handle(ClientEvent::CancelQueued { item_id }).unwrap();

        assert_eq!(client.queue_items().count(), 0);
        assert_eq!(statuses(&client), [DeliveryStatus::Failed], "message keeps a retry affordance");
    }

    #[test]
    fn cancelling_an_inflight_item_is_refused() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "hi");
        go(&mut client, true);

        let item_id = client.queue_items().next().unwrap().id;
        let result = client.handle(ClientEvent::CancelQueued { item_id });

        assert!(matches!(
            result,
            Err(ClientError::Queue(tether_core::QueueError::ItemInFlight { .. }))
        ));
    }

    #[test]
    fn unresolved_send_times_out_to_failed() {
        let (mut client, env) = client();
        let actions = send(&mut client, "hi");
        let dispatches = dispatched(&actions);

        env.advance(Duration::from_secs(31));
        client.handle(ClientEvent::Tick { now: env.now() }).unwrap();

        assert_eq!(statuses(&client), [DeliveryStatus::Failed]);
        assert_eq!(client.queue_items().count(), 1);

        // The attempt may still complete; a late acknowledgment is
        // authoritative and supersedes the timeout.
        resolve_ok(&mut client, dispatches[0].0, "msg-1");
        assert_eq!(statuses(&client), [DeliveryStatus::Sent]);
        assert_eq!(client.queue_items().count(), 0);
    }

    #[test]
    fn late_failure_after_timeout_is_not_double_counted() {
        let (mut client, env) = client();
        let actions = send(&mut client, "hi");
        let dispatches = dispatched(&actions);

        env.advance(Duration::from_secs(31));
        client.handle(ClientEvent::Tick { now: env.now() }).unwrap();
        let parked = client.queue_items().next().unwrap();
        assert_eq!(parked.retry_count, 1);

        resolve_err(&mut client, dispatches[0].0);
        let parked = client.queue_items().next().unwrap();
        assert_eq!(parked.retry_count, 1, "timeout already accounted for this attempt");
    }

    #[test]
    fn echo_with_unknown_temp_id_appends_instead_of_crashing() {
        let (mut client, _env) = client();
        let orphan = TempIdAllocator::new(99).allocate();

        client
            .handle(ClientEvent::MessageReceived(ServerRecord {
                id: MessageId::from("msg-9"),
                temp_id: Some(orphan),
                conversation_id: conv(),
                sender_id: SenderId::from("me"),
                content: "hi".to_owned(),
                created_at: 50,
            }))
            .unwrap();

        assert_eq!(client.messages(&conv()).len(), 1, "visible duplicate is the failure mode");
    }

    #[test]
    fn ack_event_confirms_a_queued_send() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "hi");
        let temp_id = client.messages(&conv())[0].temp_id.unwrap();

        // Acknowledgment arrives via server push (e.g. after reconnect)
        // rather than a transport resolution.
        client
            .handle(ClientEvent::MessageAcknowledged {
                conversation_id: conv(),
                temp_id,
                message_id: MessageId::from("msg-1"),
                created_at: 700,
            })
            .unwrap();

        assert_eq!(statuses(&client), [DeliveryStatus::Sent]);
        assert_eq!(client.queue_items().count(), 0);
    }

    #[test]
    fn unknown_attempt_resolution_is_an_error() {
        let (mut client, _env) = client();
        let result = client.handle(ClientEvent::SendResolved {
            attempt_id: 777,
            outcome: SendOutcome::Failed { reason: "stale".to_owned() },
        });

        assert!(matches!(result, Err(ClientError::UnknownAttempt { attempt_id: 777 })));
    }

    #[test]
    fn group_read_receipts_accumulate_readers() {
        let (mut client, _env) = client();
        let actions = send(&mut client, "hi");
        resolve_ok(&mut client, dispatched(&actions)[0].0, "msg-1");

        for reader in ["user-2", "user-3", "user-2"] {
            client
                .handle(ClientEvent::MessagesRead {
                    conversation_id: conv(),
                    message_ids: vec![MessageId::from("msg-1")],
                    reader: Some(ReadReceipt { reader_id: SenderId::from(reader), read_at: 10 }),
                })
                .unwrap();
        }

        let message = &client.messages(&conv())[0];
        assert_eq!(message.status, DeliveryStatus::Read);
        assert_eq!(message.read_by.len(), 2, "reader records are append-only and deduplicated");
    }

    #[test]
    fn remote_delete_tombstones_the_message() {
        let (mut client, _env) = client();
        client
            .handle(ClientEvent::MessageReceived(ServerRecord {
                id: MessageId::from("msg-1"),
                temp_id: None,
                conversation_id: conv(),
                sender_id: SenderId::from("user-2"),
                content: "secret".to_owned(),
                created_at: 10,
            }))
            .unwrap();

        client
            .handle(ClientEvent::MessageDeleted {
                conversation_id: conv(),
                message_id: MessageId::from("msg-1"),
            })
            .unwrap();

        let message = &client.messages(&conv())[0];
        assert!(message.is_deleted);
        assert!(message.content.is_empty());
    }

    #[test]
    fn sends_behind_a_blocked_queue_preserve_order() {
        let (mut client, _env) = client();
        let actions = send(&mut client, "a");
        resolve_err(&mut client, dispatched(&actions)[0].0);

        // Still online, but "a" is parked failed; "b" must queue behind it
        // rather than leapfrog.
        let actions = send(&mut client, "b");
        assert!(dispatched(&actions).is_empty());
        assert_eq!(client.queue_items().count(), 2);
    }

    #[test]
    fn typing_expires_via_tick() {
        let (mut client, env) = client();
        client
            .handle(ClientEvent::TypingStarted {
                conversation_id: conv(),
                user_id: SenderId::from("user-2"),
            })
            .unwrap();
        assert_eq!(client.typing_peers(&conv()).len(), 1);

        env.advance(Duration::from_secs(6));
        let actions = client.handle(ClientEvent::Tick { now: env.now() }).unwrap();

        assert!(actions.contains(&ClientAction::TypingChanged { conversation_id: conv() }));
        assert!(client.typing_peers(&conv()).is_empty());
    }

    #[test]
    fn presence_events_update_the_roster() {
        let (mut client, _env) = client();

        let actions =
            client.handle(ClientEvent::PeerOnline { user_id: SenderId::from("user-2") }).unwrap();
        assert_eq!(actions, vec![ClientAction::PresenceChanged]);

        let actions =
            client.handle(ClientEvent::PeerOnline { user_id: SenderId::from("user-2") }).unwrap();
        assert!(actions.is_empty(), "duplicate presence notifications are idempotent");

        assert_eq!(client.online_peers().count(), 1);
    }

    #[test]
    fn reset_clears_session_state() {
        let (mut client, _env) = client();
        go(&mut client, false);
        send(&mut client, "hi");
        client.handle(ClientEvent::PeerOnline { user_id: SenderId::from("user-2") }).unwrap();

        client.reset();

        assert!(client.messages(&conv()).is_empty());
        assert_eq!(client.queue_items().count(), 0);
        assert_eq!(client.online_peers().count(), 0);
        assert!(!client.is_draining());
    }
}
