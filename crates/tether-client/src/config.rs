//! Client tunables.

use std::time::Duration;

/// How long an unresolved send attempt may stay `Pending` before it is
/// forced to `Failed`.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between automatic re-attempts of a queued item.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Attempt budget per queued item.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// How long a typing notification stays visible without a refresh.
const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(5);

/// Tunables for the [`crate::Client`].
///
/// The send timeout is a configuration choice, not a protocol contract; the
/// remote peer never learns about it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Unresolved sends are forced to `Failed` after this long.
    pub send_timeout: Duration,
    /// Backoff between automatic re-attempts of a queued item.
    pub retry_delay: Duration,
    /// Attempt budget per queued item.
    pub max_retries: u32,
    /// Expiry for peer typing notifications.
    pub typing_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            typing_ttl: DEFAULT_TYPING_TTL,
        }
    }
}
