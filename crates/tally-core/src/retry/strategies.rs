//! Delay schedules and error classification for the retry engine

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::time::Duration;

/// Delay before the next attempt, given the attempt that just failed
/// (1-indexed).
///
/// Jitter (up to a quarter of the base) lands *before* the cap: below the
/// cap the schedule's growth dominates the jitter, and at the cap every
/// delay equals `max_delay_ms` exactly, so delays never shrink from one
/// attempt to the next.
///
/// # Example
///
/// ```rust
/// use tally_core::retry::calculate_delay;
/// use tally_core::types::RetryPolicy;
///
/// let policy = RetryPolicy::cloud_sync();
/// assert_eq!(calculate_delay(&policy, 1, false).as_secs(), 30);
/// assert_eq!(calculate_delay(&policy, 2, false).as_secs(), 60);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, failed_attempt: u32, jitter: bool) -> Duration {
    let base = base_delay_ms(policy, failed_attempt);
    let widened = if jitter { jittered(base) } else { base };
    Duration::from_millis(widened.min(policy.max_delay_ms))
}

fn base_delay_ms(policy: &RetryPolicy, failed_attempt: u32) -> u64 {
    let step = failed_attempt.saturating_sub(1);
    match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let factor = policy.backoff_multiplier.powi(step as i32);
            (policy.initial_delay_ms as f64 * factor) as u64
        }
    }
}

fn jittered(base_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    base_ms + rand::rng().random_range(0..=base_ms / 4)
}

/// Classifies an error as transient (worth another attempt) or permanent
/// (stop immediately).
///
/// The sync worker narrows retries to network-class failures with this so
/// auth rejections fail fast instead of burning the attempt budget.
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// True when the error should be retried.
    fn should_retry(&self, error: &E) -> bool;
}

/// Treats every failure as transient. The engine default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// Wraps a plain closure or `fn` as a predicate.
pub struct ClosurePredicate<F>(F);

impl<F> ClosurePredicate<F> {
    /// Wrap `classify` as a [`RetryPredicate`].
    pub fn new(classify: F) -> Self {
        Self(classify)
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.0)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn policy_with(strategy: RetryStrategy, initial_ms: u64, cap_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            strategy,
            backoff_multiplier: 2.0,
            initial_delay_ms: initial_ms,
            max_delay_ms: cap_ms,
        }
    }

    #[test]
    fn test_none_strategy_never_waits() {
        let policy = policy_with(RetryStrategy::None, 1_000, 30_000);

        assert_eq!(calculate_delay(&policy, 1, false), Duration::ZERO);
        assert_eq!(calculate_delay(&policy, 2, true), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay_is_flat() {
        let policy = policy_with(RetryStrategy::FixedDelay, 1_000, 30_000);

        for attempt in 1..=4 {
            assert_eq!(
                calculate_delay(&policy, attempt, false),
                Duration::from_millis(1_000)
            );
        }
    }

    #[test]
    fn test_exponential_doubles_per_attempt() {
        let policy = policy_with(RetryStrategy::ExponentialBackoff, 1_000, 30_000);

        let expected = [1_000, 2_000, 4_000, 8_000];
        for (index, want) in expected.iter().enumerate() {
            let attempt = index as u32 + 1;
            assert_eq!(
                calculate_delay(&policy, attempt, false),
                Duration::from_millis(*want)
            );
        }
    }

    #[test]
    fn test_growth_stops_at_the_cap() {
        let policy = policy_with(RetryStrategy::ExponentialBackoff, 1_000, 5_000);

        // Attempt 5 would be 16 s uncapped.
        assert_eq!(
            calculate_delay(&policy, 5, false),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = policy_with(RetryStrategy::FixedDelay, 1_000, 30_000);

        for _ in 0..100 {
            let delay = calculate_delay(&policy, 1, true);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn test_capped_delays_are_exact() {
        // Base for attempt 2 is 8 s, past the cap, so jitter cannot move it.
        let policy = policy_with(RetryStrategy::ExponentialBackoff, 4_000, 5_000);

        for _ in 0..100 {
            assert_eq!(
                calculate_delay(&policy, 2, true),
                Duration::from_millis(5_000)
            );
        }
    }

    #[test]
    fn test_delays_monotonically_non_decreasing_with_jitter() {
        // The sync schedule relies on delays never shrinking between
        // attempts, even with jitter enabled and even at the cap.
        let policy = RetryPolicy::cloud_sync();

        for _ in 0..100 {
            let mut floor = Duration::ZERO;
            for attempt in 1..=8 {
                let delay = calculate_delay(&policy, attempt, true);
                assert!(
                    delay >= floor,
                    "delay for attempt {attempt} ({delay:?}) shrank below {floor:?}"
                );
                floor = delay;
            }
        }
    }

    #[test]
    fn test_cloud_sync_schedule_shape() {
        let policy = RetryPolicy::cloud_sync();

        // 30 s, then 60 s; the 1 h cap is never reached within the
        // three-attempt ceiling.
        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_secs(30));
        assert_eq!(calculate_delay(&policy, 2, false), Duration::from_secs(60));
    }

    #[test]
    fn test_always_retry_accepts_anything() {
        assert!(AlwaysRetry.should_retry(&Error::remote("reset")));
        assert!(AlwaysRetry.should_retry(&Error::remote_status(401, "denied")));
    }

    #[test]
    fn test_closure_predicate_classifies_domain_errors() {
        // The worker's classification: 5xx and transport failures are
        // transient, everything else permanent.
        let predicate = ClosurePredicate::new(|err: &Error| match err {
            Error::NetworkUnavailable { .. } => true,
            Error::Remote { status, .. } => status.is_none_or(|code| code >= 500),
            _ => false,
        });

        assert!(predicate.should_retry(&Error::remote_status(503, "unavailable")));
        assert!(predicate.should_retry(&Error::remote("connection reset")));
        assert!(!predicate.should_retry(&Error::remote_status(401, "unauthorized")));
        assert!(!predicate.should_retry(&Error::remote_status(404, "missing")));
    }
}
