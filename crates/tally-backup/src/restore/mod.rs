//! Restore pipeline.
//!
//! A restore replaces the live store's bytes with a snapshot's, with a
//! safety snapshot taken first so every failure path leads back to the
//! pre-restore state. Stages: validate, safety snapshot, swap, migrate,
//! count. Failures before the safety snapshot leave the store untouched;
//! failures after it roll back and surface as an interrupted restore.

use crate::checksum;
use crate::local::LocalBackupManager;
use crate::snapshot::{Snapshot, SnapshotLocation, SnapshotName};
use crate::store::LiveStore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tally_core::{Error, Result};
use tracing::{error, info, warn};

pub mod compatibility;
pub mod marker;
pub mod recovery;
pub mod transaction;

pub use compatibility::{is_compatible, VersionCompatibility};
pub use marker::{RestoreMarker, RestoreStage, MARKER_FILENAME};
pub use recovery::{recover_interrupted_restore, RecoveryReport};
pub use transaction::{apply_rollback, RestoreTransaction};

/// Outcome of a completed restore.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub source: Snapshot,
    pub safety_snapshot: String,
    pub items_restored: u64,
    pub migrated: bool,
}

/// What a restore would do, from validation alone.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub source: Snapshot,
    pub compatibility: VersionCompatibility,
}

pub struct RestoreManager {
    store: Arc<dyn LiveStore>,
    local: Arc<LocalBackupManager>,
}

impl RestoreManager {
    pub fn new(store: Arc<dyn LiveStore>, local: Arc<LocalBackupManager>) -> Self {
        Self { store, local }
    }

    /// Runs the validation stage only and reports what a restore would do.
    /// Takes no safety snapshot and writes no marker.
    pub async fn dry_run(&self, path: &Path) -> Result<RestorePlan> {
        info!(path = %path.display(), "restore dry run");
        let (source, compatibility) = self.validate(path).await?;
        Ok(RestorePlan {
            source,
            compatibility,
        })
    }

    /// Restores the snapshot at `path` over the live store.
    pub async fn restore(&self, path: &Path) -> Result<RestoreReport> {
        info!(path = %path.display(), "starting restore");

        info!("stage 1/4: validating snapshot");
        let (source, compat) = self.validate(path).await?;

        info!("stage 2/4: taking safety snapshot");
        let mut tx =
            RestoreTransaction::begin(self.store.clone(), &self.local, &source.name).await?;
        let safety_snapshot = tx.safety_snapshot().name.clone();

        match self.swap_and_migrate(path, &compat, &mut tx).await {
            Ok(items_restored) => {
                tx.commit().await?;
                info!(
                    source = %source.name,
                    items = items_restored,
                    "restore complete"
                );
                Ok(RestoreReport {
                    source,
                    safety_snapshot,
                    items_restored,
                    migrated: compat.needs_migration(),
                })
            }
            Err(err) => {
                warn!(error = %err, "restore failed after the safety snapshot, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        error = %rollback_err,
                        "rollback failed, marker retained for the next start"
                    );
                    return Err(Error::restore_interrupted(format!(
                        "{err}; rollback also failed: {rollback_err}"
                    )));
                }
                Err(Error::restore_interrupted(err.to_string()))
            }
        }
    }

    /// Stages 1–3 of the pipeline: the snapshot file exists, decodes, matches
    /// its companion digest, and is not from a newer schema than the store.
    async fn validate(&self, path: &Path) -> Result<(Snapshot, VersionCompatibility)> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::invalid_snapshot_name(path.display().to_string()))?;
        if !path.exists() {
            return Err(Error::snapshot_not_found(file_name));
        }

        let parsed = SnapshotName::parse(&file_name)?;
        let companion = checksum::verify_against_companion(path)?;

        let current = self.store.schema_version().await?;
        let compat = VersionCompatibility::check(parsed.schema_version, current);
        compat.ensure()?;

        let size_bytes = fs::metadata(path)?.len();
        let source = Snapshot::from_name(
            &parsed,
            file_name,
            SnapshotLocation::Local,
            size_bytes,
            companion.digest,
        );
        Ok((source, compat))
    }

    async fn swap_and_migrate(
        &self,
        path: &Path,
        compat: &VersionCompatibility,
        tx: &mut RestoreTransaction,
    ) -> Result<u64> {
        info!("stage 3/4: swapping store file");
        tx.advance(RestoreStage::Swapping)?;
        transaction::swap_store_file(self.store.as_ref(), path).await?;

        if compat.needs_migration() {
            info!(
                from = compat.snapshot_version,
                to = compat.current_version,
                "stage 4/4: migrating restored store"
            );
            tx.advance(RestoreStage::Migrating)?;
            self.store
                .migrate(compat.snapshot_version, compat.current_version)
                .await?;
        } else {
            info!("stage 4/4: no migration needed");
        }

        tx.advance(RestoreStage::Finalizing)?;
        self.store.row_count().await
    }
}
