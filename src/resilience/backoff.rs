//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `initial × multiplier^(attempt-1)`, capped at `max`. With `jitter` on, up
/// to 10% of the capped delay is added.
pub fn calculate_backoff(attempt: u32, initial: Duration, max: Duration, multiplier: f64, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_secs = initial.as_secs_f64() * multiplier.powi(exponent);
    let capped = Duration::try_from_secs_f64(delay_secs)
        .unwrap_or(max)
        .min(max);

    if !jitter {
        return capped;
    }

    // Up to 10% of the delay
    let factor = rand::thread_rng().gen_range(0.0..=0.1);
    capped + capped.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_backoff_calculation() {
        let initial = 100 * MS;
        let max = 2000 * MS;
        assert_eq!(calculate_backoff(1, initial, max, 2.0, false), 100 * MS);
        assert_eq!(calculate_backoff(2, initial, max, 2.0, false), 200 * MS);
        assert_eq!(calculate_backoff(3, initial, max, 2.0, false), 400 * MS);
        assert_eq!(calculate_backoff(10, initial, max, 2.0, false), max);
        assert_eq!(calculate_backoff(0, initial, max, 2.0, false), Duration::ZERO);
    }

    #[test]
    fn test_huge_exponent_is_capped() {
        let max = Duration::from_secs(30);
        assert_eq!(calculate_backoff(5000, 100 * MS, max, 10.0, false), max);
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..100 {
            let delay = calculate_backoff(2, 100 * MS, 2000 * MS, 2.0, true);
            assert!(delay >= 200 * MS);
            assert!(delay <= 220 * MS);
        }
    }
}
