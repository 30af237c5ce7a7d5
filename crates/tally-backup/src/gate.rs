//! The subsystem operation gate.
//!
//! Backup creation, restore, and the sync worker's whole run all require
//! exclusive access to the live store's primary file, so they serialize on
//! this single gate. One extra request may queue behind the running one; a
//! further request displaces the queued waiter, which observes
//! [`Superseded`] instead of ever running. Scheduled sync dispatch uses
//! [`OperationGate::try_acquire`] and simply skips when the gate is busy.

use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

/// Returned to a queued waiter that was displaced by a newer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superseded;

impl std::fmt::Display for Superseded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("superseded by a newer queued request")
    }
}

struct GateState {
    busy: bool,
    /// The single queued waiter; replaced (and thereby superseded) by the
    /// next request to arrive while the gate is busy.
    waiter: Option<oneshot::Sender<()>>,
}

#[derive(Clone)]
pub struct OperationGate {
    state: Arc<Mutex<GateState>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                busy: false,
                waiter: None,
            })),
        }
    }

    /// Acquires the gate, queueing behind a running operation if necessary.
    ///
    /// Returns `Err(Superseded)` if a newer request displaced this one while
    /// it was queued.
    pub async fn acquire(&self, label: &'static str) -> Result<GateGuard, Superseded> {
        let receiver = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.busy {
                state.busy = true;
                debug!(operation = label, "gate acquired");
                return Ok(GateGuard {
                    state: Arc::clone(&self.state),
                    label,
                });
            }

            let (tx, rx) = oneshot::channel();
            if state.waiter.replace(tx).is_some() {
                debug!(operation = label, "queued request superseded");
            }
            rx
        };

        match receiver.await {
            Ok(()) => {
                // The releasing guard handed the gate over; busy stays set.
                debug!(operation = label, "gate acquired after wait");
                Ok(GateGuard {
                    state: Arc::clone(&self.state),
                    label,
                })
            }
            Err(_) => Err(Superseded),
        }
    }

    /// Acquires only if the gate is idle; used by scheduled dispatch, which
    /// skips rather than queues.
    pub fn try_acquire(&self, label: &'static str) -> Option<GateGuard> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.busy {
            return None;
        }
        state.busy = true;
        debug!(operation = label, "gate acquired");
        Some(GateGuard {
            state: Arc::clone(&self.state),
            label,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).busy
    }

    pub fn has_waiter(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .waiter
            .is_some()
    }
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the gate until dropped.
pub struct GateGuard {
    state: Arc<Mutex<GateState>>,
    label: &'static str,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(operation = self.label, "gate released");
        if let Some(waiter) = state.waiter.take() {
            // Hand the gate over without clearing busy, so a try_acquire
            // cannot slip in between release and wake-up. A waiter whose
            // future was dropped refuses the send; fall through to idle.
            if waiter.send(()).is_ok() {
                return;
            }
        }
        state.busy = false;
    }
}
