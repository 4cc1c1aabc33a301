//! Identifier types and the temporary-id allocator.
//!
//! Permanent identifiers ([`MessageId`], [`ConversationId`], [`SenderId`])
//! are opaque strings assigned by the authoritative remote peer; the core
//! never inspects their contents. [`TempId`] is client-assigned and exists
//! only between optimistic creation and reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

opaque_id!(
    /// Permanent message identifier, assigned by the remote peer.
    MessageId
);

opaque_id!(
    /// Conversation identifier (foreign reference, not owned by this core).
    ConversationId
);

opaque_id!(
    /// Identity of a message sender.
    SenderId
);

/// Client-assigned identifier for a not-yet-confirmed entity.
///
/// Combines a random session nonce with a monotonic sequence number, so two
/// ids from the same allocator never collide and ids from different sessions
/// collide only if their nonces do. Collision would silently corrupt an
/// unrelated message during reconciliation, so uniqueness is structural
/// rather than runtime-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId {
    session: u64,
    seq: u64,
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{:016x}-{}", self.session, self.seq)
    }
}

/// Allocates [`TempId`]s unique within the lifetime of a client session.
///
/// No network or storage side effects.
#[derive(Debug)]
pub struct TempIdAllocator {
    session: u64,
    next_seq: u64,
}

impl TempIdAllocator {
    /// Create an allocator for a session identified by `session_nonce`.
    ///
    /// The nonce should come from [`crate::Environment::random_u64`].
    pub fn new(session_nonce: u64) -> Self {
        Self { session: session_nonce, next_seq: 0 }
    }

    /// Allocate the next temporary id. Never returns the same value twice.
    pub fn allocate(&mut self) -> TempId {
        let id = TempId { session: self.session, seq: self.next_seq };
        self.next_seq += 1;
        id
    }
}
