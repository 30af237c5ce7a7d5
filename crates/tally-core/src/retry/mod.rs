//! Retry plumbing shared by the backup engine.
//!
//! The schedule lives in [`crate::types::RetryPolicy`]; this module turns
//! a policy into an executed loop. Callers compose a [`RetryExecutor`]
//! from a policy, a predicate that splits transient from permanent
//! failures, an observer for logging or counting, and an optional cancel
//! check consulted between attempts. Jitter widens each delay before the
//! cap is applied, so the delay sequence never shrinks between attempts.
//!
//! ```rust
//! use tally_core::retry::{ClosurePredicate, RetryExecutorBuilder, TracingObserver};
//! use tally_core::types::RetryPolicy;
//! use tally_core::Error;
//!
//! # async fn demo() -> Result<(), tally_core::retry::RetryError<Error>> {
//! let uploaded = RetryExecutorBuilder::new()
//!     .with_policy(RetryPolicy::cloud_sync())
//!     .with_predicate(ClosurePredicate::new(|err: &Error| {
//!         matches!(err, Error::NetworkUnavailable { .. })
//!     }))
//!     .with_observer(TracingObserver::new("cloud-sync"))
//!     .build()
//!     .execute(|| async { Ok::<_, Error>("snapshot pushed") })
//!     .await?;
//! # let _ = uploaded;
//! # Ok(())
//! # }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{retry_with_policy, RetryExecutor, RetryExecutorBuilder};
pub use observer::{CountingObserver, NoOpObserver, RetryObserver, TracingObserver};
pub use strategies::{calculate_delay, AlwaysRetry, ClosurePredicate, RetryPredicate};
