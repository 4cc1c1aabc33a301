//! Per-message delivery status.

use serde::{Deserialize, Serialize};

/// Delivery status of a message.
///
/// Successful delivery advances along `Pending → Sent → Delivered → Read`;
/// [`advance`](DeliveryStatus::advance) enforces that receipts never move a
/// message backward. `Failed` sits outside the ladder: it is entered only by
/// an explicit failure and exited only by an explicit retry (or a late
/// authoritative acknowledgment, handled by the reconciler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created locally, not yet acknowledged by the remote peer.
    Pending,
    /// Acknowledged by the authoritative peer.
    Sent,
    /// A delivery receipt named this message.
    Delivered,
    /// A read receipt named this message.
    Read,
    /// A send attempt failed; awaiting user retry or cancellation.
    Failed,
}

impl DeliveryStatus {
    /// Position on the success ladder. `None` for `Failed`, which does not
    /// participate in receipt ordering.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// Apply a receipt-driven transition, returning the resulting status.
    ///
    /// Only moves forward on the ladder; a stale `Delivered` arriving after
    /// `Read` leaves the status unchanged. Transitions into or out of
    /// `Failed` never happen here.
    pub fn advance(self, next: Self) -> Self {
        match (self.rank(), next.rank()) {
            (Some(current), Some(candidate)) if candidate > current => next,
            _ => self,
        }
    }

    /// Whether this status is at or beyond `other` on the success ladder.
    pub fn is_at_least(self, other: Self) -> bool {
        matches!((self.rank(), other.rank()), (Some(a), Some(b)) if a >= b)
    }
}
