//! Reconnect backoff: exponential with full jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before reconnect attempt `attempt` (1-based): uniformly random in
/// `0..=min(cap, base * 2^(attempt-1))`.
#[must_use]
pub fn full_jitter(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let ceiling = exponential_ceiling(base, cap, attempt);
    if ceiling.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::rng().random_range(0..=ceiling.as_millis().min(u128::from(u64::MAX)));
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

fn exponential_ceiling(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << shift).min(cap)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        assert_eq!(exponential_ceiling(base, cap, 1), Duration::from_secs(1));
        assert_eq!(exponential_ceiling(base, cap, 2), Duration::from_secs(2));
        assert_eq!(exponential_ceiling(base, cap, 5), Duration::from_secs(16));
        assert_eq!(exponential_ceiling(base, cap, 30), cap);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        for attempt in 1..10 {
            let delay = full_jitter(base, cap, attempt);
            assert!(delay <= exponential_ceiling(base, cap, attempt));
        }
    }
}
