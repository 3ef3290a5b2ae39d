//! Time sources.
//!
//! State machines read time only through [`Clock`] so tests can drive
//! generation expiry and rate-limit windows without sleeping.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A source of monotonic and wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic reading used for windows and expiries.
    fn now(&self) -> Instant;

    /// Wall-clock reading used for timestamps shown to humans.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Default clock for constructors that do not take one.
pub fn system() -> SharedClock {
    Arc::new(SystemClock)
}

/// A manually advanced clock.
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    base_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_utc: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        // Offsets here never approach chrono's range limits.
        self.base_utc + chrono::Duration::from_std(self.offset()).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advances_both_readings() {
        let clock = MockClock::new();
        let t0 = clock.now();
        let w0 = clock.utc_now();

        clock.advance(Duration::from_millis(250));

        assert_eq!(clock.now() - t0, Duration::from_millis(250));
        assert_eq!((clock.utc_now() - w0).num_milliseconds(), 250);
    }
}
