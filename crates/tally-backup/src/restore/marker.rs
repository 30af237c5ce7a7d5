//! The on-disk restore-in-progress marker.
//!
//! The marker is written after the safety snapshot exists and cleared only
//! once the restore has fully committed. Its presence at startup means a
//! restore died mid-flight and the store must be rolled back before anyone
//! reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tally_core::Result;
use uuid::Uuid;

/// Marker filename inside the backup directory.
pub const MARKER_FILENAME: &str = ".restore-in-progress.json";

/// How far the restore got before the marker was last written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreStage {
    /// Safety snapshot taken, primary file untouched.
    Prepared,
    /// Primary file swap underway or complete.
    Swapping,
    /// Swapped store is being migrated to the current schema.
    Migrating,
    /// Row counting and bookkeeping after migration.
    Finalizing,
}

impl RestoreStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStage::Prepared => "prepared",
            RestoreStage::Swapping => "swapping",
            RestoreStage::Migrating => "migrating",
            RestoreStage::Finalizing => "finalizing",
        }
    }
}

impl std::fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreMarker {
    pub restore_id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Filename of the snapshot being restored.
    pub source: String,

    /// Filename of the safety snapshot to roll back to.
    pub safety_snapshot: String,

    pub stage: RestoreStage,
}

impl RestoreMarker {
    pub fn new(source: impl Into<String>, safety_snapshot: impl Into<String>) -> Self {
        Self {
            restore_id: Uuid::new_v4(),
            started_at: Utc::now(),
            source: source.into(),
            safety_snapshot: safety_snapshot.into(),
            stage: RestoreStage::Prepared,
        }
    }

    /// Persists the marker atomically (temp file, then rename).
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let staged = path.with_extension("json.tmp");
        fs::write(&staged, json)?;
        let file = fs::File::open(&staged)?;
        file.sync_all()?;
        fs::rename(&staged, path)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Location of the marker for a given backup directory.
pub fn marker_path(backup_dir: &Path) -> PathBuf {
    backup_dir.join(MARKER_FILENAME)
}

/// Removes the marker. Missing markers are fine; anything else propagates.
pub fn clear_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
