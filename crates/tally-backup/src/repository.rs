//! The repository façade: the subsystem's front door.
//!
//! Composes the local manager, restore pipeline, remote store, and sync
//! worker behind a handful of operations, serialized on the operation gate.
//! Internal errors stop here: gate-wrapped operations return the tagged
//! outcome types, translated at this boundary and nowhere else. Opening the
//! repository also runs crash recovery, so callers never see a store with an
//! interrupted restore still in it.

use crate::checksum;
use crate::gate::OperationGate;
use crate::local::LocalBackupManager;
use crate::outcome::{BackupOutcome, RestoreOutcome, SyncStatus};
use crate::remote::{RemoteStore, TransferProgress};
use crate::restore::{recover_interrupted_restore, RestoreManager, RestorePlan, RestoreReport};
use crate::retention;
use crate::settings::{BackupSettings, SettingsStore};
use crate::snapshot::{
    is_auto_slot, is_snapshot_file, Snapshot, SnapshotKind, SnapshotLocation, SnapshotName,
    AUTO_SLOT_NAME,
};
use crate::store::LiveStore;
use crate::sync::scheduler::CloudSyncScheduler;
use crate::sync::worker::{SyncSlot, SyncWorker};
use crate::sync::{DeviceConditions, IdentityProvider};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tally_core::{Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Subdirectory of the data directory holding local snapshots.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Subdirectory where remote downloads land until they verify.
pub const STAGING_DIR_NAME: &str = "staging";

pub struct BackupRepository {
    local: Arc<LocalBackupManager>,
    restorer: RestoreManager,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    settings: Arc<dyn SettingsStore>,
    worker: Arc<SyncWorker>,
    gate: OperationGate,
    status: watch::Sender<SyncStatus>,
    staging_dir: PathBuf,
}

impl BackupRepository {
    /// Opens the subsystem over `data_dir` and the injected collaborators.
    ///
    /// Recovery of an interrupted restore runs first; its failure propagates,
    /// because a store that may hold half a restore must not be served.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        store: Arc<dyn LiveStore>,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        conditions: Arc<dyn DeviceConditions>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let backup_dir = data_dir.join(BACKUP_DIR_NAME);
        let staging_dir = data_dir.join(STAGING_DIR_NAME);
        fs::create_dir_all(&backup_dir)?;

        recover_interrupted_restore(store.as_ref(), &backup_dir).await?;

        let local = Arc::new(LocalBackupManager::new(store.clone(), backup_dir));
        let restorer = RestoreManager::new(store, local.clone());

        let initial = SyncStatus::from_last_sync(settings.load()?.last_cloud_sync);
        let (status, _) = watch::channel(initial);

        let worker = Arc::new(SyncWorker::new(
            local.clone(),
            remote.clone(),
            identity.clone(),
            conditions,
            settings.clone(),
            status.clone(),
        ));

        info!(data_dir = %data_dir.display(), "backup repository opened");
        Ok(Self {
            local,
            restorer,
            remote,
            identity,
            settings,
            worker,
            gate: OperationGate::new(),
            status,
            staging_dir,
        })
    }

    /// Creates a local snapshot now.
    pub async fn create_backup(&self) -> BackupOutcome {
        let Ok(_guard) = self.gate.acquire("backup").await else {
            return BackupOutcome::superseded();
        };

        let started = Instant::now();
        match self.local.create_backup(SnapshotKind::Routine).await {
            Ok(snapshot) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.reconcile_local(Some(snapshot.created_at)).await;
                BackupOutcome::success(snapshot, duration_ms)
            }
            Err(err) => {
                warn!(error = %err, "backup failed");
                BackupOutcome::from_error(&err)
            }
        }
    }

    /// Restores the named snapshot over the live store. The name is looked
    /// up locally first, then in the remote store.
    pub async fn restore(&self, name: &str) -> RestoreOutcome {
        let Ok(_guard) = self.gate.acquire("restore").await else {
            return RestoreOutcome::superseded();
        };

        let started = Instant::now();
        match self.run_restore(name).await {
            Ok(report) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                RestoreOutcome::success(report.items_restored, report.source, duration_ms)
            }
            Err(err) => {
                warn!(snapshot = %name, error = %err, "restore failed");
                RestoreOutcome::from_error(&err)
            }
        }
    }

    /// Validation-only restore: reports what [`BackupRepository::restore`]
    /// would do without touching the live store.
    pub async fn dry_run_restore(&self, name: &str) -> Result<RestorePlan> {
        validate_source_name(name)?;

        let local_path = self.local.backup_dir().join(name);
        if local_path.exists() {
            return self.restorer.dry_run(&local_path).await;
        }

        let staged = self.fetch_remote_snapshot(name).await?;
        let result = self.restorer.dry_run(&staged.path).await;
        staged.discard();
        let mut plan = result?;
        plan.source.location = SnapshotLocation::Remote;
        Ok(plan)
    }

    /// Uploads a fresh snapshot through the given slot, right now. Device
    /// constraints are ignored; a signed-in identity is still required.
    pub async fn sync_now(&self, slot: SyncSlot) -> BackupOutcome {
        let Ok(_guard) = self.gate.acquire("sync").await else {
            return BackupOutcome::superseded();
        };

        let started = Instant::now();
        match self.worker.sync_now(slot).await {
            Ok(snapshot) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                // The run took a fresh local snapshot on its way up.
                self.reconcile_local(Some(snapshot.created_at)).await;
                BackupOutcome::success(snapshot, duration_ms)
            }
            Err(err) => {
                self.reconcile_local(None).await;
                BackupOutcome::from_error(&err)
            }
        }
    }

    /// Local snapshots, newest first. Corrupted entries are included, marked.
    pub async fn list_local(&self) -> Result<Vec<Snapshot>> {
        self.local.list_backups().await
    }

    /// Remote snapshots, newest first. Listing is passive: signed out or
    /// unreachable yields an empty listing, never an error.
    pub async fn list_remote(&self) -> Vec<Snapshot> {
        if !self.identity.is_authenticated() {
            debug!("not signed in, remote listing empty");
            return Vec::new();
        }
        let objects = match self.remote.list().await {
            Ok(objects) => objects,
            Err(err) => {
                warn!(error = %err, "remote listing failed");
                return Vec::new();
            }
        };

        let mut snapshots = Vec::new();
        for object in objects {
            if !is_snapshot_file(&object.name) {
                continue;
            }
            if is_auto_slot(&object.name) {
                match self.resolve_auto_slot(object.size_bytes).await {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(err) => debug!(error = %err, "auto slot unreadable, skipped"),
                }
                continue;
            }
            match SnapshotName::parse(&object.name) {
                Ok(parsed) => snapshots.push(Snapshot::from_name(
                    &parsed,
                    &object.name,
                    SnapshotLocation::Remote,
                    object.size_bytes,
                    "",
                )),
                Err(_) => debug!(object = %object.name, "unrecognized remote object skipped"),
            }
        }
        snapshots.sort_by(|a, b| retention::recency_key(b).cmp(&retention::recency_key(a)));
        snapshots
    }

    /// Deletes one local snapshot and its companion.
    pub async fn delete_backup(&self, name: &str) -> Result<()> {
        self.local.delete_backup(name).await?;
        self.reconcile_local(None).await;
        Ok(())
    }

    /// Deletes every local snapshot. Returns how many were removed.
    pub async fn delete_all_backups(&self) -> Result<usize> {
        let removed = self.local.delete_all_backups().await?;
        self.reconcile_local(None).await;
        Ok(removed)
    }

    /// Recomputes every local snapshot's digest against its companion.
    pub async fn verify_backups(&self) -> Result<Vec<Snapshot>> {
        self.local.verify_backups().await
    }

    /// Current persisted settings.
    pub fn settings(&self) -> Result<BackupSettings> {
        self.settings.load()
    }

    /// Watchable replication status.
    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Builds the recurring dispatcher over this repository's worker and
    /// gate. The caller decides whether to spawn it.
    pub fn scheduler(&self) -> CloudSyncScheduler {
        CloudSyncScheduler::new(Arc::clone(&self.worker), self.gate.clone())
    }

    pub fn set_local_backups_enabled(&self, enabled: bool) -> Result<BackupSettings> {
        self.settings
            .update(Box::new(move |s| s.local_backups_enabled = enabled))
    }

    pub fn set_cloud_sync_enabled(&self, enabled: bool) -> Result<BackupSettings> {
        self.settings
            .update(Box::new(move |s| s.cloud_sync_enabled = enabled))
    }

    /// Records the host-reported account identity; `None` signs out.
    pub fn record_account(&self, account: Option<String>) -> Result<BackupSettings> {
        self.settings.update(Box::new(move |s| s.set_account(account)))
    }

    async fn run_restore(&self, name: &str) -> Result<RestoreReport> {
        validate_source_name(name)?;

        let local_path = self.local.backup_dir().join(name);
        if local_path.exists() {
            let result = self.restorer.restore(&local_path).await;
            // Win or lose, a safety snapshot joined the listing.
            self.reconcile_local(None).await;
            return result;
        }

        info!(snapshot = %name, "not on disk, trying the remote store");
        let staged = self.fetch_remote_snapshot(name).await?;
        let result = self.restorer.restore(&staged.path).await;
        staged.discard();
        self.reconcile_local(None).await;

        let mut report = result?;
        report.source.location = SnapshotLocation::Remote;
        Ok(report)
    }

    /// Downloads the named remote snapshot into the staging directory and
    /// verifies it against its companion. The companion comes first: without
    /// a digest to check, the object is not restorable at all.
    async fn fetch_remote_snapshot(&self, name: &str) -> Result<StagedDownload> {
        fs::create_dir_all(&self.staging_dir)?;

        let companion_object = checksum::companion_name(name);
        let probe = self.staging_dir.join(&companion_object);
        self.remote
            .get(&companion_object, &probe, None)
            .await
            .map_err(|err| match err {
                Error::SnapshotNotFound { .. } => Error::snapshot_not_found(name),
                other => other,
            })?;
        let content = fs::read_to_string(&probe);
        let _ = fs::remove_file(&probe);
        let companion = checksum::parse_companion(&content?)?;

        // The auto slot stages under its originating timestamped name, so
        // the decoded schema version and creation time survive.
        let staged_name = match &companion.origin {
            Some(origin) if is_auto_slot(name) => origin.clone(),
            _ if is_auto_slot(name) => {
                return Err(Error::invalid_snapshot_name(format!(
                    "{name} companion has no origin filename"
                )))
            }
            _ => name.to_string(),
        };

        let staged = StagedDownload {
            path: self.staging_dir.join(staged_name),
        };
        let result = self
            .download_and_verify(name, &staged.path, &companion.digest)
            .await;
        self.publish_idle();
        if let Err(err) = result {
            staged.discard();
            return Err(err);
        }
        Ok(staged)
    }

    /// Reads the auto slot's companion to recover the identity of whatever
    /// timestamped snapshot currently occupies it.
    async fn resolve_auto_slot(&self, size_bytes: u64) -> Result<Snapshot> {
        fs::create_dir_all(&self.staging_dir)?;
        let companion_object = checksum::companion_name(AUTO_SLOT_NAME);
        let probe = self.staging_dir.join(&companion_object);
        self.remote.get(&companion_object, &probe, None).await?;
        let content = fs::read_to_string(&probe);
        let _ = fs::remove_file(&probe);
        let companion = checksum::parse_companion(&content?)?;

        let origin = companion.origin.as_deref().ok_or_else(|| {
            Error::invalid_snapshot_name(format!("{AUTO_SLOT_NAME} companion has no origin"))
        })?;
        let parsed = SnapshotName::parse(origin)?;
        Ok(Snapshot::from_name(
            &parsed,
            AUTO_SLOT_NAME,
            SnapshotLocation::Remote,
            size_bytes,
            companion.digest,
        ))
    }

    async fn download_and_verify(&self, object: &str, dest: &Path, digest: &str) -> Result<()> {
        let status = self.status.clone();
        let progress: TransferProgress = Arc::new(move |transferred, total| {
            if total > 0 {
                status.send_replace(SyncStatus::Syncing {
                    upload_pct: 0,
                    download_pct: (transferred.min(total) * 100 / total) as u8,
                });
            }
        });

        let bytes = self.remote.get(object, dest, Some(progress)).await?;
        debug!(object = %object, bytes, "snapshot downloaded");

        checksum::write_companion(dest, digest)?;
        checksum::verify_against_companion(dest)?;
        Ok(())
    }

    /// Recomputes the local aggregates from a fresh listing; `stamp` also
    /// records a completed backup time. Failure only warns: the aggregates
    /// are rebuilt from the listing on the next pass anyway.
    async fn reconcile_local(&self, stamp: Option<DateTime<Utc>>) {
        let result = async {
            let listing = self.local.list_backups().await?;
            let count = listing.len() as u64;
            let bytes = listing.iter().map(|s| s.size_bytes).sum::<u64>();
            self.settings.update(Box::new(move |s| {
                if let Some(at) = stamp {
                    s.last_local_backup = Some(at);
                }
                s.local_snapshot_count = count;
                s.local_snapshot_bytes = bytes;
            }))?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(err) = result {
            warn!(error = %err, "local settings reconcile failed");
        }
    }

    fn publish_idle(&self) {
        let last = self.settings.load().ok().and_then(|s| s.last_cloud_sync);
        self.status.send_replace(SyncStatus::from_last_sync(last));
    }
}

/// A downloaded snapshot awaiting restore, removed afterwards either way.
struct StagedDownload {
    path: PathBuf,
}

impl StagedDownload {
    fn discard(&self) {
        let _ = fs::remove_file(&self.path);
        let _ = fs::remove_file(checksum::companion_path(&self.path));
    }
}

/// Restore takes a bare snapshot filename; anything path-like is refused
/// before it can reach a filesystem join.
fn validate_source_name(name: &str) -> Result<()> {
    if name.contains(['/', '\\']) || !is_snapshot_file(name) {
        return Err(Error::snapshot_not_found(name));
    }
    Ok(())
}
