//! The sync worker: one replication run at a time.
//!
//! A run always produces a fresh local snapshot first, then uploads it
//! single-shot together with its checksum companion, prunes the remote
//! timestamped channel, and records the result in settings and on the
//! status channel. Transient remote failures retry with exponential
//! backoff; a scheduled run that loses its constraints mid-flight cancels
//! and removes whatever it half-uploaded.

use crate::checksum;
use crate::local::LocalBackupManager;
use crate::outcome::SyncStatus;
use crate::remote::RemoteStore;
use crate::retention::RetentionPolicy;
use crate::settings::SettingsStore;
use crate::snapshot::{
    is_auto_slot, is_snapshot_file, validate_label, Snapshot, SnapshotKind, SnapshotLocation,
    SnapshotName, AUTO_SLOT_NAME,
};
use crate::sync::constraints::{self, DeviceConditions, IdentityProvider};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tally_core::retry::{ClosurePredicate, RetryExecutorBuilder, TracingObserver};
use tally_core::types::RetryPolicy;
use tally_core::{Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Re-checked between retry attempts; returning true stops the run.
pub type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Which remote name a run uploads under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSlot {
    /// The fixed, overwritten object of the scheduled channel.
    Auto,

    /// The snapshot's own timestamped name; subject to remote retention.
    Timestamped,

    /// The snapshot's name with a user label appended; kept until the user
    /// deletes it.
    Named { label: String },
}

impl SyncSlot {
    /// Rejects labels that cannot become filename fragments.
    pub fn validate(&self) -> Result<()> {
        match self {
            SyncSlot::Named { label } => validate_label(label),
            _ => Ok(()),
        }
    }

    /// Remote object name for a local snapshot uploaded through this slot.
    pub fn object_name(&self, snapshot_name: &str) -> Result<String> {
        match self {
            SyncSlot::Auto => Ok(AUTO_SLOT_NAME.to_string()),
            SyncSlot::Timestamped => Ok(snapshot_name.to_string()),
            SyncSlot::Named { label } => {
                validate_label(label)?;
                let parsed = SnapshotName::parse(snapshot_name)?;
                let named = SnapshotName {
                    kind: SnapshotKind::Named {
                        label: label.clone(),
                    },
                    ..parsed
                };
                Ok(named.file_name())
            }
        }
    }
}

enum UploadOutcome {
    Uploaded(Snapshot),
    Cancelled,
}

/// Replicates local snapshots to the remote store.
pub struct SyncWorker {
    local: Arc<LocalBackupManager>,
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    conditions: Arc<dyn DeviceConditions>,
    settings: Arc<dyn SettingsStore>,
    status: watch::Sender<SyncStatus>,
    retention: RetentionPolicy,
    retry_policy: RetryPolicy,
}

impl SyncWorker {
    pub fn new(
        local: Arc<LocalBackupManager>,
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        conditions: Arc<dyn DeviceConditions>,
        settings: Arc<dyn SettingsStore>,
        status: watch::Sender<SyncStatus>,
    ) -> Self {
        Self {
            local,
            remote,
            identity,
            conditions,
            settings,
            status,
            retention: RetentionPolicy::remote(),
            retry_policy: RetryPolicy::cloud_sync(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub(crate) fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.settings.load().ok().and_then(|s| s.last_cloud_sync)
    }

    /// Scheduled entry point. Evaluates the full constraint set and skips
    /// with `Ok(None)` when any constraint fails, at dispatch or mid-run.
    pub async fn run_scheduled(&self) -> Result<Option<Snapshot>> {
        let settings = self.settings.load()?;
        if let Some(reason) =
            constraints::evaluate(&settings, self.identity.as_ref(), self.conditions.as_ref())
        {
            info!(reason = %reason, "scheduled sync skipped");
            return Ok(None);
        }

        let cancel = self.constraint_cancel_check();
        match self.upload(&SyncSlot::Auto, Some(&cancel)).await {
            Ok(UploadOutcome::Uploaded(snapshot)) => Ok(Some(snapshot)),
            Ok(UploadOutcome::Cancelled) => {
                self.publish(SyncStatus::from_last_sync(self.last_sync()));
                Ok(None)
            }
            Err(err) => {
                self.publish(SyncStatus::Failed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Manual entry point. Ignores device constraints; a signed-in identity
    /// is still required because the remote refuses anonymous writes anyway.
    pub async fn sync_now(&self, slot: SyncSlot) -> Result<Snapshot> {
        let result = self.run_manual(slot).await;
        if let Err(err) = &result {
            self.publish(SyncStatus::Failed {
                message: err.to_string(),
            });
        }
        result
    }

    async fn run_manual(&self, slot: SyncSlot) -> Result<Snapshot> {
        if !self.identity.is_authenticated() {
            return Err(Error::auth_failed("not signed in"));
        }
        match self.upload(&slot, None).await? {
            UploadOutcome::Uploaded(snapshot) => Ok(snapshot),
            // No cancel check is installed on the manual path.
            UploadOutcome::Cancelled => Err(Error::remote("sync cancelled")),
        }
    }

    /// One full replication run: fresh snapshot, upload, prune, record.
    async fn upload(&self, slot: &SyncSlot, cancel: Option<&CancelCheck>) -> Result<UploadOutcome> {
        slot.validate()?;
        self.publish(SyncStatus::Syncing {
            upload_pct: 0,
            download_pct: 0,
        });

        let snapshot = self.local.create_backup(SnapshotKind::Routine).await?;
        let object = slot.object_name(&snapshot.name)?;
        let companion_object = checksum::companion_name(&object);

        let payload = Arc::new(fs::read(self.local.backup_dir().join(&snapshot.name))?);
        // The auto slot gets overwritten, so its companion carries the
        // originating timestamped name alongside the digest.
        let companion = match slot {
            SyncSlot::Auto => {
                checksum::companion_line_with_origin(&snapshot.checksum, &snapshot.name)
            }
            _ => format!("{}\n", snapshot.checksum),
        };
        let companion_payload = Arc::new(companion.into_bytes());

        info!(
            snapshot = %snapshot.name,
            object = %object,
            size = snapshot.size_bytes,
            "uploading snapshot"
        );

        let builder = RetryExecutorBuilder::new()
            .with_policy(self.retry_policy.clone())
            .with_predicate(ClosurePredicate::new(is_transient))
            .with_observer(TracingObserver::new("cloud-sync"));
        let builder = match cancel {
            Some(check) => {
                let check = Arc::clone(check);
                builder.with_cancel_check(move || check())
            }
            None => builder,
        };

        let executor = builder.build();
        let attempt = executor
            .execute(|| {
                let remote = Arc::clone(&self.remote);
                let object = object.clone();
                let companion_object = companion_object.clone();
                let payload = Arc::clone(&payload);
                let companion_payload = Arc::clone(&companion_payload);
                async move {
                    remote.put(&object, payload.as_ref().clone()).await?;
                    remote
                        .put(&companion_object, companion_payload.as_ref().clone())
                        .await?;
                    Ok::<(), Error>(())
                }
            })
            .await;

        match attempt {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                info!(object = %object, "sync cancelled, removing partial upload");
                self.cleanup_partial(&object).await;
                return Ok(UploadOutcome::Cancelled);
            }
            Err(err) => {
                let attempts = err.attempts();
                let source = err
                    .into_source()
                    .unwrap_or_else(|| Error::remote("upload failed before any attempt"));
                warn!(object = %object, attempts, error = %source, "upload failed");
                return Err(source);
            }
        }

        self.publish(SyncStatus::Syncing {
            upload_pct: 100,
            download_pct: 0,
        });

        let now = Utc::now();
        match self.groom_remote().await {
            Ok((count, bytes)) => {
                self.settings.update(Box::new(move |s| {
                    s.last_cloud_sync = Some(now);
                    s.remote_snapshot_count = count;
                    s.remote_snapshot_bytes = bytes;
                }))?;
            }
            Err(err) => {
                // The upload itself succeeded; grooming catches up next run.
                warn!(error = %err, "remote prune/reconcile failed");
                self.settings
                    .update(Box::new(move |s| s.last_cloud_sync = Some(now)))?;
            }
        }

        self.publish(SyncStatus::Synced { last: now });
        info!(object = %object, "sync complete");

        let uploaded = Snapshot {
            name: object,
            location: SnapshotLocation::Remote,
            ..snapshot
        };
        Ok(UploadOutcome::Uploaded(uploaded))
    }

    /// Prunes the remote timestamped channel to its ceiling and returns the
    /// surviving snapshot count and byte total. Named entries, the auto
    /// slot, and anything unrecognized are left alone.
    async fn groom_remote(&self) -> Result<(u64, u64)> {
        let objects = self.remote.list().await?;

        let mut snapshots = Vec::new();
        for object in &objects {
            if !is_snapshot_file(&object.name) || is_auto_slot(&object.name) {
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
                Err(_) => debug!(object = %object.name, "unrecognized remote object left alone"),
            }
        }

        let doomed: Vec<String> = self
            .retention
            .plan(&snapshots)
            .into_iter()
            .map(|s| s.name.clone())
            .collect();
        for name in &doomed {
            self.remote.delete(name).await?;
            self.remote.delete(&checksum::companion_name(name)).await?;
            debug!(object = %name, "pruned remote snapshot");
        }
        if !doomed.is_empty() {
            info!(pruned = doomed.len(), "remote retention applied");
        }

        let doomed: HashSet<&str> = doomed.iter().map(String::as_str).collect();
        let mut count = 0;
        let mut bytes = 0;
        for object in &objects {
            if is_snapshot_file(&object.name) && !doomed.contains(object.name.as_str()) {
                count += 1;
                bytes += object.size_bytes;
            }
        }
        Ok((count, bytes))
    }

    async fn cleanup_partial(&self, object: &str) {
        for name in [object.to_string(), checksum::companion_name(object)] {
            if let Err(err) = self.remote.delete(&name).await {
                warn!(object = %name, error = %err, "could not remove partial upload");
            }
        }
    }

    fn constraint_cancel_check(&self) -> CancelCheck {
        let settings = Arc::clone(&self.settings);
        let identity = Arc::clone(&self.identity);
        let conditions = Arc::clone(&self.conditions);
        Arc::new(move || match settings.load() {
            Ok(current) => {
                constraints::evaluate(&current, identity.as_ref(), conditions.as_ref()).is_some()
            }
            // An unreadable settings file is no reason to abort a transfer.
            Err(_) => false,
        })
    }

    fn publish(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }
}

/// Network trouble, timeouts, and 5xx-class responses are worth retrying;
/// everything else is permanent.
fn is_transient(err: &Error) -> bool {
    match err {
        Error::NetworkUnavailable { .. } => true,
        Error::Remote { status, .. } => status.is_none_or(|code| code >= 500),
        _ => false,
    }
}
