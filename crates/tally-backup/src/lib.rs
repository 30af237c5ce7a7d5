//! # tally-backup
//!
//! Backup, retention, and restore for the Tally data store: point-in-time
//! snapshots of the live store, verified with SHA-256 companions, pruned by
//! per-location retention ceilings, replicated to a remote object store, and
//! restored through a rollback-safe pipeline.
//!
//! # Features
//!
//! - **Snapshots**: checkpoint-then-copy of the store's primary file, named
//!   `tally_v{schema}_{yyyyMMdd}_{HHmmss}.snapshot`, each with a `.sha256`
//!   companion
//! - **Retention**: keep the newest 7 locally and 30 remotely; named backups
//!   and the newest snapshot are never pruned
//! - **Restore**: validate, safety snapshot, atomic swap, migrate, count;
//!   every failure past the safety snapshot rolls back, and an interrupted
//!   restore is rolled back automatically at the next open
//! - **Cloud sync**: scheduled uploads into a fixed auto slot under device
//!   constraints, manual uploads into timestamped or named slots, retried
//!   with exponential backoff
//! - **Closed outcomes**: façade operations return tagged
//!   `Success | Failure{kind}` enums instead of raw errors
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally_backup::{
//!     BackupRepository, DeviceConditions, HttpRemoteStore, IdentityProvider,
//!     JournalStore, JsonSettingsStore,
//! };
//!
//! struct Host;
//!
//! impl IdentityProvider for Host {
//!     fn is_authenticated(&self) -> bool {
//!         true
//!     }
//!     fn access_token(&self) -> Option<String> {
//!         Some("token".to_string())
//!     }
//! }
//!
//! impl DeviceConditions for Host {
//!     fn network_unmetered(&self) -> bool {
//!         true
//!     }
//!     fn charging(&self) -> bool {
//!         true
//!     }
//!     fn battery_low(&self) -> bool {
//!         false
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let data_dir = std::path::PathBuf::from("/var/lib/tally");
//!     let store = Arc::new(JournalStore::open(data_dir.join("tally.db"), 1)?);
//!     let remote =
//!         Arc::new(HttpRemoteStore::new("https://sync.example.net")?.with_token("token"));
//!     let settings = Arc::new(JsonSettingsStore::in_dir(&data_dir));
//!
//!     let repository = BackupRepository::open(
//!         &data_dir,
//!         store,
//!         remote,
//!         Arc::new(Host),
//!         Arc::new(Host),
//!         settings,
//!     )
//!     .await?;
//!
//!     let outcome = repository.create_backup().await;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod gate;
pub mod local;
pub mod outcome;
pub mod remote;
pub mod repository;
pub mod restore;
pub mod retention;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use gate::{OperationGate, Superseded};
pub use local::LocalBackupManager;
pub use outcome::{
    BackupFailureKind, BackupOutcome, RestoreFailureKind, RestoreOutcome, SyncStatus,
};
pub use remote::{HttpRemoteStore, RemoteObject, RemoteStore, TransferProgress};
pub use repository::{BackupRepository, BACKUP_DIR_NAME, STAGING_DIR_NAME};
pub use restore::{RecoveryReport, RestoreManager, RestorePlan, RestoreReport};
pub use retention::{RetentionPolicy, LOCAL_RETAIN_COUNT, REMOTE_RETAIN_COUNT};
pub use settings::{BackupSettings, JsonSettingsStore, SettingsStore};
pub use snapshot::{Snapshot, SnapshotKind, SnapshotLocation, SnapshotName, SnapshotStatus};
pub use store::{JournalStore, LiveStore};
pub use sync::{
    CloudSyncScheduler, DeviceConditions, IdentityProvider, SkipReason, SyncSlot, SyncWorker,
};
