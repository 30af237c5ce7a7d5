//! The retry loop
//!
//! [`RetryExecutor`] drives an async operation under a policy, consulting
//! a predicate after each failure, an optional cancel check between
//! attempts, and an observer at every state change.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Run `op` under `policy` with the default predicate and no observer.
///
/// The short form for callers that only want the schedule. Anything
/// needing classification, logging, or cancellation goes through
/// [`RetryExecutorBuilder`].
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + Send + 'static,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .build()
        .execute(op)
        .await
}

/// Assembles a [`RetryExecutor`] piece by piece.
///
/// # Example
///
/// ```rust
/// use tally_core::retry::{RetryExecutorBuilder, TracingObserver};
/// use tally_core::types::RetryPolicy;
///
/// let upload_retry = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::cloud_sync())
///     .with_observer(TracingObserver::new("snapshot-upload"))
///     .build();
/// # let _ = upload_retry;
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    cancel: Option<CancelCheck>,
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Default policy, every error retried, no observer, jitter on.
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
            cancel: None,
        }
    }
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Replace the schedule policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Turn random delay widening on or off. On by default; tests turn it
    /// off for exact schedules.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the transient-versus-permanent classifier.
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
            cancel: self.cancel,
        }
    }

    /// Attach an observer for attempt events.
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
            cancel: self.cancel,
        }
    }

    /// Check consulted before every attempt; returning true stops the
    /// loop with a cancelled error. The sync worker hooks its
    /// constraint re-check in here so an unplugged device stops retrying
    /// instead of burning the budget.
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancel = Some(Arc::new(check));
        self
    }

    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            jitter: self.jitter,
            cancel: self.cancel,
        }
    }
}

/// Drives operations through the retry schedule.
///
/// Built by [`RetryExecutorBuilder`]; reusable across operations of the
/// same error type.
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    cancel: Option<CancelCheck>,
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// Run `op` until it succeeds, the attempt ceiling is hit, the
    /// predicate rejects an error as permanent, or the cancel check
    /// fires.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + Send + 'static,
        P: RetryPredicate<E>,
    {
        let limit = self.policy.max_attempts;
        if limit == 0 {
            return Err(RetryError::cancelled(0, None));
        }

        let started = Instant::now();
        let mut previous: Option<E> = None;
        let mut attempt = 0u32;

        loop {
            if self.cancel_requested() {
                self.observer
                    .halted(attempt, previous.as_ref().map(|err| err as &dyn fmt::Display));
                return Err(RetryError::cancelled(attempt, previous));
            }

            attempt += 1;
            self.observer.attempt_started(attempt, limit);

            let failure = match op().await {
                Ok(value) => {
                    self.observer.succeeded(attempt, started.elapsed());
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.predicate.should_retry(&failure) {
                self.observer.halted(attempt, Some(&failure));
                return Err(RetryError::rejected(failure));
            }
            if attempt == limit {
                self.observer.exhausted(attempt, &failure);
                return Err(RetryError::exhausted(attempt, failure, started.elapsed()));
            }

            let pause = calculate_delay(&self.policy, attempt, self.jitter);
            self.observer.attempt_failed(attempt, &failure, pause);
            previous = Some(failure);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.as_ref().is_some_and(|check| check())
    }
}
