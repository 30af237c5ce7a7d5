//! Persisted backup settings.
//!
//! Settings survive restarts through the [`SettingsStore`] trait. The shipped
//! implementation is a JSON file guarded by an exclusive `fs4` lock and
//! replaced via temp-file-then-rename, so a read-modify-write of one flag
//! never loses a concurrently written other flag.

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tally_core::{Error, Result};

/// Filename of the settings file inside the data directory.
pub const SETTINGS_FILENAME: &str = "settings.json";

/// User-facing configuration and bookkeeping for the subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub local_backups_enabled: bool,
    pub cloud_sync_enabled: bool,

    pub last_local_backup: Option<DateTime<Utc>>,
    pub last_cloud_sync: Option<DateTime<Utc>>,

    /// Remote account identity; `None` when signed out.
    pub account: Option<String>,
    pub signed_in: bool,

    /// Aggregates recomputed from listings, never hand-maintained.
    pub local_snapshot_count: u64,
    pub local_snapshot_bytes: u64,
    pub remote_snapshot_count: u64,
    pub remote_snapshot_bytes: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            local_backups_enabled: true,
            cloud_sync_enabled: false,
            last_local_backup: None,
            last_cloud_sync: None,
            account: None,
            signed_in: false,
            local_snapshot_count: 0,
            local_snapshot_bytes: 0,
            remote_snapshot_count: 0,
            remote_snapshot_bytes: 0,
        }
    }
}

impl BackupSettings {
    /// Records the identity reported by the host; keeps `signed_in` and
    /// `account` consistent with each other.
    pub fn set_account(&mut self, account: Option<String>) {
        self.signed_in = account.is_some();
        self.account = account;
    }

    /// Checks the cross-field invariant: signed-in requires an account.
    pub fn validate(&self) -> Result<()> {
        if self.signed_in && self.account.is_none() {
            return Err(Error::settings("signed_in is set but account is empty"));
        }
        Ok(())
    }
}

/// Persistence seam for [`BackupSettings`].
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<BackupSettings>;

    /// Atomic read-modify-write: loads the current settings, applies the
    /// closure, persists, and returns the result.
    fn update(
        &self,
        apply: Box<dyn FnOnce(&mut BackupSettings) + Send + '_>,
    ) -> Result<BackupSettings>;
}

/// JSON-file settings store.
pub struct JsonSettingsStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self { path, lock_path }
    }

    /// Opens the store at `{data_dir}/settings.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SETTINGS_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        lock.lock_exclusive()
            .map_err(|e| Error::settings(format!("failed to lock settings file: {e}")))?;
        Ok(lock)
    }

    fn read(&self) -> Result<BackupSettings> {
        if !self.path.exists() {
            return Ok(BackupSettings::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let settings: BackupSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn write(&self, settings: &BackupSettings) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");
        let temp = File::create(&temp_path)?;
        serde_json::to_writer_pretty(&temp, settings)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<BackupSettings> {
        // Shared read through the same lock keeps readers from observing a
        // half-applied update on filesystems without atomic rename visibility.
        let _lock = self.acquire_lock()?;
        self.read()
    }

    fn update(
        &self,
        apply: Box<dyn FnOnce(&mut BackupSettings) + Send + '_>,
    ) -> Result<BackupSettings> {
        let _lock = self.acquire_lock()?;

        let mut settings = self.read()?;
        apply(&mut settings);
        settings.validate()?;
        self.write(&settings)?;

        Ok(settings)
    }
}
