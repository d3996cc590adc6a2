//! Time abstraction for testability
//!
//! Caches and retry loops read time through [`Clock`] so tests can drive
//! expiry deterministically with [`MockClock`] instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Trait for time operations to enable deterministic testing
///
/// `now` is monotonic and backs in-process expiry; `system_time` is wall
/// clock and backs timestamps that are persisted across restarts.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> i64 {
        let millis = self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        i64::try_from(millis).unwrap_or(i64::MAX)
    }
}

/// Type-erased clock shared between tiers and services.
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Convenience constructor for a [`SharedClock`] backed by system time.
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed counter, so a test can hand one clone to
/// the code under test and advance time through another. Wall-clock time
/// starts at the UNIX epoch.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Returns a [`SharedClock`] view of this mock; advancing `self` moves it.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed = duration;
        }
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + self.elapsed()
    }
}
