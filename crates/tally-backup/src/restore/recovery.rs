//! Crash recovery for restores that died mid-flight.
//!
//! Runs once at subsystem start, before the store is handed to anyone. An
//! un-cleared marker means the previous process stopped somewhere between
//! safety snapshot and commit; the store is rolled back to the safety
//! snapshot and the marker cleared.

use crate::restore::marker::{clear_marker, marker_path, RestoreMarker, RestoreStage};
use crate::restore::transaction::apply_rollback;
use crate::store::LiveStore;
use std::path::Path;
use tally_core::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What recovery found and undid.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub restore_id: Uuid,
    pub source: String,
    pub safety_snapshot: String,
    pub stage: RestoreStage,
}

/// Detects an interrupted restore and rolls the store back.
///
/// Returns `None` when there was nothing to recover. On rollback failure
/// the marker stays in place so the next start retries, and the error
/// propagates: a store that may hold half a restore is not served.
pub async fn recover_interrupted_restore(
    store: &dyn LiveStore,
    backup_dir: &Path,
) -> Result<Option<RecoveryReport>> {
    let marker_file = marker_path(backup_dir);
    if !marker_file.exists() {
        return Ok(None);
    }

    let marker = match RestoreMarker::read(&marker_file) {
        Ok(marker) => marker,
        Err(err) => {
            error!(error = %err, "restore marker exists but cannot be read");
            return Err(err);
        }
    };

    warn!(
        restore_id = %marker.restore_id,
        source = %marker.source,
        stage = %marker.stage,
        started_at = %marker.started_at,
        "found interrupted restore, rolling back"
    );

    match apply_rollback(store, backup_dir, &marker.safety_snapshot).await {
        Ok(()) => {
            clear_marker(&marker_file)?;
            info!(
                restore_id = %marker.restore_id,
                safety = %marker.safety_snapshot,
                "interrupted restore rolled back"
            );
            Ok(Some(RecoveryReport {
                restore_id: marker.restore_id,
                source: marker.source,
                safety_snapshot: marker.safety_snapshot,
                stage: marker.stage,
            }))
        }
        Err(err) => {
            error!(
                restore_id = %marker.restore_id,
                safety = %marker.safety_snapshot,
                error = %err,
                "automatic rollback failed, marker retained"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBackupManager;
    use crate::snapshot::SnapshotKind;
    use crate::store::JournalStore;
    use serde::Serialize;
    use serde_json::json;
    use std::sync::Arc;
    use tally_core::Error;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Row {
        kind: &'static str,
    }

    async fn interrupted_fixture() -> (Arc<JournalStore>, LocalBackupManager, TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JournalStore::open(temp_dir.path().join("tally.db"), 1).unwrap());
        store.append(&Row { kind: "coffee" }).unwrap();
        let local = LocalBackupManager::new(store.clone(), temp_dir.path().join("backups"));

        let safety = local.create_backup(SnapshotKind::Safety).await.unwrap();
        let mut marker = RestoreMarker::new("tally_v1_20250101_120000.snapshot", &safety.name);
        marker.stage = RestoreStage::Swapping;
        marker.write(&marker_path(local.backup_dir())).unwrap();

        // Leave the primary the way a crash mid-swap would.
        store.close().await.unwrap();
        std::fs::write(
            store.primary_path(),
            "{\"schema_version\":1}\n{\"kind\":\"junk\"}\n",
        )
        .unwrap();
        store.reopen().await.unwrap();

        (store, local, temp_dir, safety.name)
    }

    #[tokio::test]
    async fn test_no_marker_means_nothing_to_recover() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JournalStore::open(temp_dir.path().join("tally.db"), 1).unwrap());

        let report = recover_interrupted_restore(store.as_ref(), &temp_dir.path().join("backups"))
            .await
            .unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_recovery_rolls_back_and_clears_marker() {
        let (store, local, _dir, safety_name) = interrupted_fixture().await;

        let report = recover_interrupted_restore(store.as_ref(), local.backup_dir())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.safety_snapshot, safety_name);
        assert_eq!(report.stage, RestoreStage::Swapping);
        assert_eq!(store.read_rows().unwrap(), vec![json!({"kind": "coffee"})]);
        assert!(!marker_path(local.backup_dir()).exists());
    }

    #[tokio::test]
    async fn test_recovery_runs_only_once() {
        let (store, local, _dir, _safety) = interrupted_fixture().await;

        recover_interrupted_restore(store.as_ref(), local.backup_dir())
            .await
            .unwrap();
        let second = recover_interrupted_restore(store.as_ref(), local.backup_dir())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_missing_safety_snapshot_keeps_marker() {
        let (store, local, _dir, safety_name) = interrupted_fixture().await;
        local.delete_backup(&safety_name).await.unwrap();

        let err = recover_interrupted_restore(store.as_ref(), local.backup_dir())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SnapshotNotFound { .. }));
        assert!(marker_path(local.backup_dir()).exists());
    }

    #[tokio::test]
    async fn test_unreadable_marker_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JournalStore::open(temp_dir.path().join("tally.db"), 1).unwrap());
        let backups = temp_dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::write(marker_path(&backups), "not json").unwrap();

        let result = recover_interrupted_restore(store.as_ref(), &backups).await;
        assert!(result.is_err());
        assert!(marker_path(&backups).exists());
    }
}
