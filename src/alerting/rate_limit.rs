//! Per-source alert rate limiting.
//!
//! Fixed window: every source gets `limit` alerts, and all counters are
//! cleared together once `reset_interval` has passed since the last reset.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct AlertRateLimiter {
    limit: u32,
    reset_interval: Duration,
    counts: HashMap<String, u32>,
    last_reset: Instant,
}

impl AlertRateLimiter {
    pub fn new(limit: u32, reset_interval: Duration, now: Instant) -> Self {
        Self {
            limit,
            reset_interval,
            counts: HashMap::new(),
            last_reset: now,
        }
    }

    /// Count one alert for `source`. False once the source is over its limit.
    pub fn try_acquire(&mut self, source: &str, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_reset) >= self.reset_interval {
            self.counts.clear();
            self.last_reset = now;
        }

        let count = self.counts.entry(source.to_string()).or_insert(0);
        if *count >= self.limit {
            return false;
        }
        *count += 1;
        true
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn reset_interval(&self) -> Duration {
        self.reset_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_per_source() {
        let start = Instant::now();
        let mut limiter = AlertRateLimiter::new(2, Duration::from_secs(60), start);

        assert!(limiter.try_acquire("scanner", start));
        assert!(limiter.try_acquire("scanner", start));
        assert!(!limiter.try_acquire("scanner", start));
        assert!(limiter.try_acquire("monitor", start));
    }

    #[test]
    fn test_window_resets_all_sources() {
        let start = Instant::now();
        let mut limiter = AlertRateLimiter::new(1, Duration::from_secs(60), start);

        assert!(limiter.try_acquire("scanner", start));
        assert!(!limiter.try_acquire("scanner", start + Duration::from_secs(59)));
        assert!(limiter.try_acquire("scanner", start + Duration::from_secs(60)));
    }
}
