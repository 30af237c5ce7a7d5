//! Cloud replication: constraints, worker, and scheduler.
//!
//! Replication is opportunistic. The scheduler decides *when* to try, the
//! constraint module decides *whether* a scheduled run may proceed, and the
//! worker does the actual transfer. Manual sync reuses the worker directly,
//! bypassing schedule and constraints both.

pub mod constraints;
pub mod scheduler;
pub mod worker;

pub use constraints::{DeviceConditions, IdentityProvider, SkipReason};
pub use scheduler::{next_dispatch, CloudSyncScheduler, SYNC_INTERVAL, SYNC_WINDOW};
pub use worker::{CancelCheck, SyncSlot, SyncWorker};
