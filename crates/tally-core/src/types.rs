//! Shared configuration types

use serde::{Deserialize, Serialize};

/// Timing and attempt limits for one class of retried work.
///
/// Missing fields deserialize to the [`Default`] values, so a partial
/// policy in config only has to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Attempt ceiling, counting the first try.
    pub max_attempts: u32,

    /// How the delay between attempts grows.
    pub strategy: RetryStrategy,

    /// Growth factor for [`RetryStrategy::ExponentialBackoff`].
    pub backoff_multiplier: f64,

    /// Delay after the first failed attempt, in milliseconds.
    pub initial_delay_ms: u64,

    /// Ceiling on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy for cloud uploads: exponential backoff from 30 s up to 1 h,
    /// three attempts before the failure is surfaced.
    pub fn cloud_sync() -> Self {
        Self {
            max_attempts: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 30_000,
            max_delay_ms: 3_600_000,
        }
    }

    /// Policy for the brief store-lock wait before a checkpoint gives up.
    pub fn store_lock() -> Self {
        Self {
            max_attempts: 4,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 1.0,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

/// Shape of the delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry immediately, no waiting.
    None,

    /// The same delay after every failure.
    FixedDelay,

    /// Delay multiplied by `backoff_multiplier` after each failure.
    #[default]
    ExponentialBackoff,
}
