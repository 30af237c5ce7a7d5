//! Local snapshot creation, listing, verification, and deletion.
//!
//! A snapshot is produced by quiescing the live store (checkpoint), copying
//! its primary file byte for byte, and recording a SHA-256 companion. The
//! hold on the store is a checkpoint plus one file copy, sized to finish
//! well inside the soft deadline for typical stores.

use crate::checksum;
use crate::retention::RetentionPolicy;
use crate::snapshot::{
    is_snapshot_file, Snapshot, SnapshotKind, SnapshotLocation, SnapshotName, SnapshotStatus,
};
use crate::store::LiveStore;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::retry::{ClosurePredicate, RetryExecutorBuilder, TracingObserver};
use tally_core::types::RetryPolicy;
use tally_core::{Error, Result};
use tracing::{debug, info, warn};

/// Free space demanded before a backup touches the store, as a multiple of
/// the current store size.
pub const FREE_SPACE_FACTOR: u64 = 2;

/// Backups are expected to hold the store for less than this; slower runs
/// log a warning and carry on.
pub const SOFT_DEADLINE: Duration = Duration::from_millis(200);

/// Creates and manages snapshots in a single local directory.
pub struct LocalBackupManager {
    store: Arc<dyn LiveStore>,
    backup_dir: PathBuf,
    retention: RetentionPolicy,
}

impl LocalBackupManager {
    pub fn new(store: Arc<dyn LiveStore>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
            retention: RetentionPolicy::local(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Produces a verified snapshot of the live store.
    ///
    /// Fails without touching the store when the device lacks a free-space
    /// margin of twice the store size. A store held by another writer is
    /// retried briefly before the error surfaces. Routine snapshots trigger
    /// retention pruning afterwards; safety and named snapshots do not.
    pub async fn create_backup(&self, kind: SnapshotKind) -> Result<Snapshot> {
        fs::create_dir_all(&self.backup_dir)?;
        self.check_free_space()?;

        let hold_started = Instant::now();
        self.checkpoint_with_retry().await?;

        let schema_version = self.store.schema_version().await?;
        let (path, name) = self.allocate_path(schema_version, kind.clone())?;

        let staged = self.copy_primary(&path)?;
        let hold = hold_started.elapsed();
        if hold > SOFT_DEADLINE {
            warn!(
                elapsed_ms = hold.as_millis() as u64,
                deadline_ms = SOFT_DEADLINE.as_millis() as u64,
                "backup held the store past the soft deadline"
            );
        }

        // Companion first, rename second: an interruption leaves an orphaned
        // companion rather than a snapshot that fails verification.
        let digest = checksum::digest_file(&staged)?;
        checksum::write_companion(&path, &digest)?;
        fs::rename(&staged, &path)?;

        let size_bytes = fs::metadata(&path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.file_name());
        let snapshot = Snapshot::from_name(
            &name,
            file_name,
            SnapshotLocation::Local,
            size_bytes,
            digest,
        );
        info!(
            name = %snapshot.name,
            size = size_bytes,
            kind = %kind,
            "created local snapshot"
        );

        if kind == SnapshotKind::Routine {
            self.prune().await?;
        }

        Ok(snapshot)
    }

    /// Lists local snapshots, newest first, verifying each against its
    /// companion. Corrupted entries stay in the listing with their status
    /// flipped; nothing is ever deleted here.
    pub async fn list_backups(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !is_snapshot_file(&file_name) {
                continue;
            }
            let parsed = match SnapshotName::parse(&file_name) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(file = %file_name, error = %err, "skipping unrecognized snapshot file");
                    continue;
                }
            };

            let path = entry.path();
            let size_bytes = entry.metadata()?.len();
            let (digest, status) = match checksum::verify_against_companion(&path) {
                Ok(companion) => (companion.digest, SnapshotStatus::Available),
                Err(Error::ChecksumMismatch { expected, .. }) => {
                    warn!(name = %file_name, "snapshot failed checksum verification");
                    (expected, SnapshotStatus::Corrupted)
                }
                Err(Error::SnapshotNotFound { .. }) => {
                    warn!(name = %file_name, "snapshot has no checksum companion");
                    (String::new(), SnapshotStatus::Corrupted)
                }
                Err(err) => return Err(err),
            };

            let mut snapshot =
                Snapshot::from_name(&parsed, file_name, SnapshotLocation::Local, size_bytes, digest);
            snapshot.status = status;
            snapshots.push(snapshot);
        }

        snapshots.sort_by(|a, b| crate::retention::recency_key(b).cmp(&crate::retention::recency_key(a)));
        Ok(snapshots)
    }

    /// Recomputes every snapshot's digest against its companion.
    pub async fn verify_backups(&self) -> Result<Vec<Snapshot>> {
        self.list_backups().await
    }

    /// Deletes one snapshot and its companion. The companion goes second,
    /// so an interruption can only ever leave an orphaned companion, never
    /// a snapshot that looks corrupted.
    pub async fn delete_backup(&self, name: &str) -> Result<()> {
        // A bare filename only; separators would escape the backup dir.
        if name.contains(['/', '\\']) || !is_snapshot_file(name) {
            return Err(Error::snapshot_not_found(name));
        }
        let path = self.backup_dir.join(name);
        if !path.exists() {
            return Err(Error::snapshot_not_found(name));
        }

        fs::remove_file(&path)?;
        match fs::remove_file(checksum::companion_path(&path)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        info!(name = %name, "deleted local snapshot");
        Ok(())
    }

    /// Deletes every local snapshot, returning how many were removed.
    pub async fn delete_all_backups(&self) -> Result<usize> {
        let snapshots = self.list_backups().await?;
        let mut deleted = 0;
        for snapshot in &snapshots {
            self.delete_backup(&snapshot.name).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Applies the retention policy to the current listing.
    pub async fn prune(&self) -> Result<usize> {
        let snapshots = self.list_backups().await?;
        let doomed: Vec<String> = self
            .retention
            .plan(&snapshots)
            .into_iter()
            .map(|s| s.name.clone())
            .collect();
        for name in &doomed {
            self.delete_backup(name).await?;
        }
        if !doomed.is_empty() {
            debug!(pruned = doomed.len(), "retention pruned local snapshots");
        }
        Ok(doomed.len())
    }

    fn check_free_space(&self) -> Result<()> {
        let store_size = fs::metadata(self.store.primary_path())?.len();
        let required = store_size.saturating_mul(FREE_SPACE_FACTOR);
        let available = fs4::available_space(&self.backup_dir)?;
        if available < required {
            return Err(Error::storage_full(required, available));
        }
        Ok(())
    }

    async fn checkpoint_with_retry(&self) -> Result<()> {
        let result = RetryExecutorBuilder::new()
            .with_policy(RetryPolicy::store_lock())
            .with_predicate(ClosurePredicate::new(|err: &Error| {
                matches!(err, Error::StoreLocked { .. })
            }))
            .with_observer(TracingObserver::new("checkpoint"))
            .build()
            .execute(|| self.store.checkpoint())
            .await;

        result.map_err(|err| {
            let path = self.store.primary_path().display().to_string();
            err.into_source().unwrap_or_else(|| Error::store_locked(path))
        })
    }

    /// Picks the next free snapshot filename, bumping the same-second
    /// counter past any existing files.
    fn allocate_path(
        &self,
        schema_version: u32,
        kind: SnapshotKind,
    ) -> Result<(PathBuf, SnapshotName)> {
        let base = SnapshotName::new(schema_version, Utc::now(), kind);
        let candidate = self.backup_dir.join(base.file_name());
        if !candidate.exists() {
            return Ok((candidate, base));
        }
        for counter in 1..=u16::MAX as u32 {
            let name = base.clone().with_counter(counter);
            let candidate = self.backup_dir.join(name.file_name());
            if !candidate.exists() {
                return Ok((candidate, name));
            }
        }
        Err(Error::checkpoint_failed(
            "could not allocate a snapshot filename",
        ))
    }

    fn copy_primary(&self, final_path: &Path) -> Result<PathBuf> {
        let staged = final_path.with_extension("snapshot.tmp");
        fs::copy(self.store.primary_path(), &staged)?;
        let file = fs::File::open(&staged)?;
        file.sync_all()?;
        Ok(staged)
    }
}
