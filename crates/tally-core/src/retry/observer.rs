//! Attempt-level visibility into the retry engine
//!
//! Observers receive a callback at each state change of a retry loop.
//! [`TracingObserver`] turns them into log lines and is what the backup
//! subsystem attaches to uploads; [`CountingObserver`] backs test
//! assertions.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Callbacks fired while a retry loop runs.
///
/// Every method has a no-op default, so implementors only override the
/// events they care about. `attempt` is 1-indexed throughout.
pub trait RetryObserver: Send + Sync {
    /// An attempt is about to run.
    fn attempt_started(&self, attempt: u32, limit: u32) {
        let _ = (attempt, limit);
    }

    /// The attempt failed and the engine will wait `backoff` before the
    /// next one.
    fn attempt_failed(&self, attempt: u32, error: &dyn fmt::Display, backoff: Duration) {
        let _ = (attempt, error, backoff);
    }

    /// The operation succeeded on `attempt`, `elapsed` after the loop
    /// started.
    fn succeeded(&self, attempt: u32, elapsed: Duration) {
        let _ = (attempt, elapsed);
    }

    /// Every allowed attempt failed; `error` is from the last one.
    fn exhausted(&self, attempts: u32, error: &dyn fmt::Display) {
        let _ = (attempts, error);
    }

    /// The loop stopped early: the cancel check fired, or the error was
    /// classified permanent.
    fn halted(&self, attempt: u32, error: Option<&dyn fmt::Display>) {
        let _ = (attempt, error);
    }
}

/// Observer that ignores every event. The engine default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {}

/// Logs retry events through `tracing`, tagged with an operation name.
///
/// Failures log at warn, giving up logs at error, recovery after a retry
/// logs at info; the routine cases stay at trace.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    /// Observer named after the operation it watches.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// The operation name attached to each log line.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl RetryObserver for TracingObserver {
    fn attempt_started(&self, attempt: u32, limit: u32) {
        tracing::trace!(
            operation = %self.operation,
            attempt,
            limit,
            "starting attempt"
        );
    }

    fn attempt_failed(&self, attempt: u32, error: &dyn fmt::Display, backoff: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt,
            error = %error,
            backoff_ms = backoff.as_millis() as u64,
            "attempt failed, backing off"
        );
    }

    fn succeeded(&self, attempt: u32, elapsed: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "recovered after retry"
            );
        } else {
            tracing::trace!(
                operation = %self.operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn exhausted(&self, attempts: u32, error: &dyn fmt::Display) {
        tracing::error!(
            operation = %self.operation,
            attempts,
            error = %error,
            "giving up, attempt ceiling reached"
        );
    }

    fn halted(&self, attempt: u32, error: Option<&dyn fmt::Display>) {
        match error {
            Some(err) => tracing::info!(
                operation = %self.operation,
                attempt,
                error = %err,
                "retry stopped early"
            ),
            None => tracing::info!(
                operation = %self.operation,
                attempt,
                "retry cancelled"
            ),
        }
    }
}

/// Counts retry events for test assertions.
#[derive(Debug, Default)]
pub struct CountingObserver {
    starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    halts: AtomicU32,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn halts(&self) -> u32 {
        self.halts.load(Ordering::SeqCst)
    }
}

impl RetryObserver for CountingObserver {
    fn attempt_started(&self, _attempt: u32, _limit: u32) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn attempt_failed(&self, _attempt: u32, _error: &dyn fmt::Display, _backoff: Duration) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn succeeded(&self, _attempt: u32, _elapsed: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn exhausted(&self, _attempts: u32, _error: &dyn fmt::Display) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn halted(&self, _attempt: u32, _error: Option<&dyn fmt::Display>) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Arc<T> {
    fn attempt_started(&self, attempt: u32, limit: u32) {
        (**self).attempt_started(attempt, limit)
    }

    fn attempt_failed(&self, attempt: u32, error: &dyn fmt::Display, backoff: Duration) {
        (**self).attempt_failed(attempt, error, backoff)
    }

    fn succeeded(&self, attempt: u32, elapsed: Duration) {
        (**self).succeeded(attempt, elapsed)
    }

    fn exhausted(&self, attempts: u32, error: &dyn fmt::Display) {
        (**self).exhausted(attempts, error)
    }

    fn halted(&self, attempt: u32, error: Option<&dyn fmt::Display>) {
        (**self).halted(attempt, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_counting_observer_tracks_a_recovery() {
        let observer = CountingObserver::new();
        let error = Error::remote("flaky");

        observer.attempt_started(1, 3);
        observer.attempt_failed(1, &error, Duration::from_millis(100));
        observer.attempt_started(2, 3);
        observer.succeeded(2, Duration::from_millis(500));

        assert_eq!(observer.starts(), 2);
        assert_eq!(observer.failures(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.exhaustions(), 0);
    }

    #[test]
    fn test_counting_observer_tracks_exhaustion() {
        let observer = CountingObserver::new();
        let error = Error::remote("down");

        for attempt in 1..=3 {
            observer.attempt_started(attempt, 3);
            if attempt < 3 {
                observer.attempt_failed(attempt, &error, Duration::from_millis(100));
            }
        }
        observer.exhausted(3, &error);

        assert_eq!(observer.starts(), 3);
        assert_eq!(observer.failures(), 2);
        assert_eq!(observer.exhaustions(), 1);
    }

    #[test]
    fn test_observer_works_through_arc() {
        let observer = Arc::new(CountingObserver::new());

        observer.attempt_started(1, 3);
        observer.halted(1, None);

        assert_eq!(observer.starts(), 1);
        assert_eq!(observer.halts(), 1);
    }

    #[test]
    fn test_tracing_observer_keeps_its_name() {
        let observer = TracingObserver::new("upload");
        assert_eq!(observer.operation(), "upload");
    }

    #[test]
    fn test_noop_observer_accepts_all_events() {
        let observer = NoOpObserver;
        let error = Error::remote("ignored");

        observer.attempt_started(1, 3);
        observer.attempt_failed(1, &error, Duration::from_millis(10));
        observer.succeeded(2, Duration::from_millis(20));
        observer.exhausted(3, &error);
        observer.halted(2, Some(&error));
    }
}
