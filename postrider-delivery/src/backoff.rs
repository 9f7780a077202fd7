//! Retry scheduling.

use std::time::Duration;

/// Base delay for the exponential schedule.
const BASE_SECS: u64 = 60;

/// Exponent cap; keeps the ceiling at `60 * 2^6` = 3840 seconds.
const MAX_EXPONENT: u32 = 6;

/// Fixed delay for validation failures and unexpected per-document errors.
const FIXED_SECS: u64 = 120;

/// Delay before a document that failed an SMTP send becomes eligible
/// again: `60 * 2^min(attempts, 6)` seconds, where `attempts` is the
/// post-increment attempt count. Monotone in `attempts`, floored at one
/// minute, capped at 64 minutes.
#[must_use]
pub fn smtp_backoff(attempts: i64) -> Duration {
    let exponent = u32::try_from(attempts.max(0)).unwrap_or(MAX_EXPONENT).min(MAX_EXPONENT);
    Duration::from_secs(BASE_SECS << exponent)
}

/// Delay for `VALIDATION` and `EXCEPTION` retries.
#[must_use]
pub const fn fixed_backoff() -> Duration {
    Duration::from_secs(FIXED_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_progression() {
        assert_eq!(smtp_backoff(0), Duration::from_secs(60));
        assert_eq!(smtp_backoff(1), Duration::from_secs(120));
        assert_eq!(smtp_backoff(2), Duration::from_secs(240));
        assert_eq!(smtp_backoff(3), Duration::from_secs(480));
        assert_eq!(smtp_backoff(6), Duration::from_secs(3840));
    }

    #[test]
    fn ceiling_holds_for_large_attempt_counts() {
        assert_eq!(smtp_backoff(7), Duration::from_secs(3840));
        assert_eq!(smtp_backoff(100), Duration::from_secs(3840));
        assert_eq!(smtp_backoff(i64::MAX), Duration::from_secs(3840));
    }

    #[test]
    fn floor_holds_for_degenerate_inputs() {
        assert_eq!(smtp_backoff(-5), Duration::from_secs(60));
    }

    #[test]
    fn monotone_in_attempts() {
        for attempts in 0..20 {
            assert!(smtp_backoff(attempts) <= smtp_backoff(attempts + 1));
        }
    }

    #[test]
    fn fixed_delay_is_two_minutes() {
        assert_eq!(fixed_backoff(), Duration::from_secs(120));
    }
}
