//! Recurring dispatch for the scheduled sync channel.
//!
//! The scheduler is a coarse tokio interval loop. Each cycle it picks a
//! uniformly random instant inside the execution window after the base
//! interval, so the host can batch wake-ups, then hands the run to the
//! worker through the operation gate. A busy gate defers to the next tick;
//! constraint decisions belong entirely to the worker.

use crate::gate::OperationGate;
use crate::sync::worker::SyncWorker;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Base interval between scheduled runs.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Execution window appended to the interval; the dispatch instant lands
/// uniformly at random inside it.
pub const SYNC_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Clock granularity of the dispatch loop.
const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Computes the next dispatch instant after a run that ended at `last`.
pub fn next_dispatch(last: DateTime<Utc>, interval: Duration, window: Duration) -> DateTime<Utc> {
    let jitter_ms = if window.is_zero() {
        0
    } else {
        rand::rng().random_range(0..=window.as_millis() as u64)
    };
    last + chrono::Duration::milliseconds(interval.as_millis() as i64)
        + chrono::Duration::milliseconds(jitter_ms as i64)
}

pub struct CloudSyncScheduler {
    worker: Arc<SyncWorker>,
    gate: OperationGate,
    interval: Duration,
    window: Duration,
    tick: Duration,
}

impl CloudSyncScheduler {
    pub fn new(worker: Arc<SyncWorker>, gate: OperationGate) -> Self {
        Self {
            worker,
            gate,
            interval: SYNC_INTERVAL,
            window: SYNC_WINDOW,
            tick: DEFAULT_TICK,
        }
    }

    /// Overrides the interval and window; tests run on millisecond scales.
    pub fn with_schedule(mut self, interval: Duration, window: Duration) -> Self {
        self.interval = interval;
        self.window = window;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// First dispatch instant. A device that has synced before waits out the
    /// remainder of its interval; one that never synced is due right away.
    fn initial_due(&self, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match last {
            Some(last) => next_dispatch(last, self.interval, self.window),
            None => Utc::now(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatch loop; runs until the owning task is dropped.
    pub async fn run(self) {
        let mut due = self.initial_due(self.worker.last_sync());
        info!(due = %due, "cloud sync scheduler started");

        loop {
            tokio::time::sleep(self.tick).await;
            if Utc::now() < due {
                continue;
            }

            let Some(_guard) = self.gate.try_acquire("scheduled-sync") else {
                debug!("sync due but another operation holds the gate, deferring");
                continue;
            };

            match self.worker.run_scheduled().await {
                Ok(Some(snapshot)) => info!(snapshot = %snapshot.name, "scheduled sync uploaded"),
                Ok(None) => debug!("scheduled sync was a no-op"),
                Err(err) => warn!(error = %err, "scheduled sync failed"),
            }
            due = next_dispatch(Utc::now(), self.interval, self.window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AUTO_SLOT_NAME;
    use crate::sync::worker::harness::create_fixture;

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_dispatch_lands_inside_window() {
        let last = Utc::now();
        let interval = Duration::from_secs(24 * 60 * 60);
        let window = Duration::from_secs(60 * 60);

        for _ in 0..200 {
            let due = next_dispatch(last, interval, window);
            assert!(due >= last + chrono::Duration::hours(24));
            assert!(due <= last + chrono::Duration::hours(25));
        }
    }

    #[test]
    fn test_zero_window_is_exact() {
        let last = Utc::now();
        let due = next_dispatch(last, Duration::from_secs(600), Duration::ZERO);
        assert_eq!(due, last + chrono::Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_due_job_uploads() {
        let fixture = create_fixture();
        let remote = fixture.remote.clone();

        // Never synced, so the job is due at the first tick.
        let scheduler = CloudSyncScheduler::new(
            Arc::new(fixture.worker),
            OperationGate::new(),
        )
        .with_schedule(Duration::from_secs(3600), Duration::ZERO)
        .with_tick(Duration::from_millis(5));
        let handle = scheduler.spawn();

        wait_for(|| remote.object(AUTO_SLOT_NAME).is_some()).await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_busy_gate_defers_until_released() {
        let fixture = create_fixture();
        let remote = fixture.remote.clone();
        let gate = OperationGate::new();

        let guard = gate.acquire("restore").await.unwrap();
        let scheduler = CloudSyncScheduler::new(Arc::new(fixture.worker), gate.clone())
            .with_schedule(Duration::from_secs(3600), Duration::ZERO)
            .with_tick(Duration::from_millis(5));
        let handle = scheduler.spawn();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(remote.object_count(), 0);

        drop(guard);
        wait_for(|| remote.object(AUTO_SLOT_NAME).is_some()).await;
        handle.abort();
    }

    #[tokio::test]
    async fn test_one_run_per_interval() {
        let fixture = create_fixture();
        let remote = fixture.remote.clone();

        let scheduler = CloudSyncScheduler::new(
            Arc::new(fixture.worker),
            OperationGate::new(),
        )
        .with_schedule(Duration::from_secs(3600), Duration::ZERO)
        .with_tick(Duration::from_millis(5));
        let handle = scheduler.spawn();

        // The companion is the run's last put, so the count is stable after it.
        let companion = crate::checksum::companion_name(AUTO_SLOT_NAME);
        wait_for(|| remote.object(&companion).is_some()).await;
        let after_first = remote.puts.load(std::sync::atomic::Ordering::SeqCst);

        // The next run is an hour out; nothing further happens now.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            remote.puts.load(std::sync::atomic::Ordering::SeqCst),
            after_first
        );
        handle.abort();
    }
}
