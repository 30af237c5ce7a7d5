//! Restore transaction: safety snapshot, marker lifecycle, rollback.
//!
//! `begin` takes the safety snapshot and writes the marker; from then on
//! the store can always be put back, whether by `rollback` in-process or
//! by crash recovery at the next open. `commit` clears the marker and the
//! restore stands.

use crate::checksum;
use crate::local::LocalBackupManager;
use crate::restore::marker::{clear_marker, marker_path, RestoreMarker, RestoreStage};
use crate::snapshot::{Snapshot, SnapshotKind};
use crate::store::LiveStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::{Error, Result};
use tracing::{info, warn};

pub struct RestoreTransaction {
    store: Arc<dyn LiveStore>,
    backup_dir: PathBuf,
    marker: RestoreMarker,
    marker_file: PathBuf,
    safety: Snapshot,
}

impl RestoreTransaction {
    /// Takes the safety snapshot and writes the marker. A restore never
    /// proceeds without a rollback path, so any failure here aborts it
    /// with the live store untouched.
    pub async fn begin(
        store: Arc<dyn LiveStore>,
        local: &LocalBackupManager,
        source: &str,
    ) -> Result<Self> {
        let safety = local.create_backup(SnapshotKind::Safety).await?;
        info!(safety = %safety.name, "created pre-restore safety snapshot");

        let marker = RestoreMarker::new(source, &safety.name);
        let marker_file = marker_path(local.backup_dir());
        marker.write(&marker_file)?;

        Ok(Self {
            store,
            backup_dir: local.backup_dir().to_path_buf(),
            marker,
            marker_file,
            safety,
        })
    }

    pub fn safety_snapshot(&self) -> &Snapshot {
        &self.safety
    }

    /// Records progress in the marker so crash recovery knows how far the
    /// restore got.
    pub fn advance(&mut self, stage: RestoreStage) -> Result<()> {
        self.marker.stage = stage;
        self.marker.write(&self.marker_file)
    }

    /// The restore stands; the marker goes away.
    pub async fn commit(self) -> Result<()> {
        clear_marker(&self.marker_file)?;
        info!(restore_id = %self.marker.restore_id, "restore committed");
        Ok(())
    }

    /// Reinstates the safety snapshot, then clears the marker. If the
    /// rollback itself fails the marker stays behind for crash recovery
    /// to retry.
    pub async fn rollback(self) -> Result<()> {
        warn!(
            restore_id = %self.marker.restore_id,
            stage = %self.marker.stage,
            "rolling back restore"
        );
        apply_rollback(self.store.as_ref(), &self.backup_dir, &self.safety.name).await?;
        clear_marker(&self.marker_file)?;
        Ok(())
    }
}

/// Copies `source`'s bytes over the live store's primary file. The store is
/// closed across the rename and reopened after, so no open handle observes
/// the swap; the temp copy lands in the primary's own directory to keep the
/// rename atomic.
pub(crate) async fn swap_store_file(store: &dyn LiveStore, source: &Path) -> Result<()> {
    let primary = store.primary_path().to_path_buf();
    let staged = primary.with_extension("swap.tmp");
    fs::copy(source, &staged)?;
    let file = fs::File::open(&staged)?;
    file.sync_all()?;

    store.close().await?;
    fs::rename(&staged, &primary)?;
    store.reopen().await?;
    Ok(())
}

/// Verifies the safety snapshot and swaps it back in. Idempotent: re-running
/// after a partial or repeated rollback converges on the same bytes.
pub async fn apply_rollback(
    store: &dyn LiveStore,
    backup_dir: &Path,
    safety_name: &str,
) -> Result<()> {
    let safety_path = backup_dir.join(safety_name);
    if !safety_path.exists() {
        return Err(Error::snapshot_not_found(safety_name));
    }
    checksum::verify_against_companion(&safety_path)?;
    swap_store_file(store, &safety_path).await?;
    info!(safety = %safety_name, "store rolled back to safety snapshot");
    Ok(())
}
