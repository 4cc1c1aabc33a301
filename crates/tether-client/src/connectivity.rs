//! Connectivity state tracking.

/// An observed connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Connectivity became available.
    WentOnline,
    /// Connectivity was lost.
    WentOffline,
}

/// Tracks the process-wide online/offline boolean.
///
/// The runtime environment reports transitions at-least-once; repeated
/// notifications of the current state are absorbed here, so downstream
/// logic (queue draining in particular) only ever sees real transitions.
#[derive(Debug, Clone)]
pub struct ConnectivityObserver {
    online: bool,
}

impl ConnectivityObserver {
    /// Create an observer with the given initial state.
    pub fn new(online: bool) -> Self {
        Self { online }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record a notification. Returns the transition, or `None` for a
    /// duplicate of the current state.
    pub fn observe(&mut self, online: bool) -> Option<Transition> {
        if online == self.online {
            return None;
        }
        self.online = online;
        Some(if online { Transition::WentOnline } else { Transition::WentOffline })
    }
}
