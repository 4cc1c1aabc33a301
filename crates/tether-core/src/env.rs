//! Environment abstraction for deterministic testing.
//!
//! Decouples delivery logic from system resources (time, randomness). Enables
//! deterministic tests with a virtual clock and seeded RNG, and production use
//! with real system resources.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect test setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while test
    /// environments use virtual time. Deadlines (send timeout, retry
    /// backoff, typing expiry) are computed by adding a `Duration`.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::ops::Sub<Output = Duration>
        + std::ops::Add<Duration, Output = Self::Instant>;

    /// Current time (monotonic).
    ///
    /// Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Used only for display-facing message timestamps; the value is
    /// overwritten by the server's timestamp on acknowledgment, so drift is
    /// tolerable.
    fn unix_time_ms(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not delivery logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, test environments produce the same sequence.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for session nonces and similar identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

pub mod test_utils {
    //! Deterministic environment for tests.

    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use super::Environment;

    /// Virtual instant measured in milliseconds from an arbitrary origin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct MockInstant(u64);

    impl std::ops::Sub for MockInstant {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(rhs.0))
        }
    }

    impl std::ops::Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self {
            Self(self.0.saturating_add(rhs.as_millis() as u64))
        }
    }

    /// Wall-clock origin for [`MockEnv::unix_time_ms`]. Arbitrary but fixed
    /// so test timestamps are stable.
    const MOCK_EPOCH_MS: u64 = 1_700_000_000_000;

    /// Deterministic environment with a manually advanced clock and a seeded
    /// xorshift RNG.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        clock_ms: Arc<AtomicU64>,
        rng_state: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Create a mock environment with the default seed.
        pub fn new() -> Self {
            Self::with_seed(0x5eed)
        }

        /// Create a mock environment with the given RNG seed.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                clock_ms: Arc::new(AtomicU64::new(0)),
                // xorshift requires a non-zero state
                rng_state: Arc::new(AtomicU64::new(seed | 1)),
            }
        }

        /// Advance the virtual clock. Affects all clones of this environment.
        pub fn advance(&self, duration: Duration) {
            self.clock_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = MockInstant;

        fn now(&self) -> MockInstant {
            MockInstant(self.clock_ms.load(Ordering::SeqCst))
        }

        fn unix_time_ms(&self) -> u64 {
            MOCK_EPOCH_MS + self.clock_ms.load(Ordering::SeqCst)
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for byte in buffer.iter_mut() {
                let next = self
                    .rng_state
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |mut x| {
                        x ^= x << 13;
                        x ^= x >> 7;
                        x ^= x << 17;
                        Some(x)
                    })
                    .unwrap_or(1);
                *byte = (next >> 32) as u8;
            }
        }
    }

}
