//! Tagged results crossing the subsystem boundary.
//!
//! Façade operations never surface the internal error enum; they return
//! these closed outcome types, which callers can match exhaustively and
//! persist or display (`Clone + Serialize`). The conversion from
//! [`tally_core::Error`] happens here and only here.

use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::Error;

/// Failure categories for backup creation and sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupFailureKind {
    StorageFull,
    StoreLocked,
    CheckpointFailed,
    CopyFailed,
    ChecksumMismatch,
    UploadFailed,
    AuthFailed,
    NetworkUnavailable,
    Unknown,
}

impl BackupFailureKind {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::StorageFull { .. } => Self::StorageFull,
            Error::StoreLocked { .. } => Self::StoreLocked,
            Error::CheckpointFailed { .. } => Self::CheckpointFailed,
            Error::ChecksumMismatch { .. } => Self::ChecksumMismatch,
            Error::Remote { .. } => Self::UploadFailed,
            Error::AuthFailed { .. } => Self::AuthFailed,
            Error::NetworkUnavailable { .. } => Self::NetworkUnavailable,
            Error::Io(_) => Self::CopyFailed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageFull => "storage-full",
            Self::StoreLocked => "store-locked",
            Self::CheckpointFailed => "checkpoint-failed",
            Self::CopyFailed => "copy-failed",
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::UploadFailed => "upload-failed",
            Self::AuthFailed => "auth-failed",
            Self::NetworkUnavailable => "network-unavailable",
            Self::Unknown => "unknown",
        }
    }
}

/// Failure categories for restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreFailureKind {
    NotFound,
    Corrupted,
    VersionIncompatible,
    DownloadFailed,
    Interrupted,
    NetworkUnavailable,
    Unknown,
}

impl RestoreFailureKind {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::SnapshotNotFound { .. } | Error::InvalidSnapshotName { .. } => Self::NotFound,
            Error::ChecksumMismatch { .. } => Self::Corrupted,
            Error::VersionIncompatible { .. } => Self::VersionIncompatible,
            Error::RestoreInterrupted { .. } => Self::Interrupted,
            Error::Remote { .. } | Error::AuthFailed { .. } => Self::DownloadFailed,
            Error::NetworkUnavailable { .. } => Self::NetworkUnavailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not-found",
            Self::Corrupted => "corrupted",
            Self::VersionIncompatible => "version-incompatible",
            Self::DownloadFailed => "download-failed",
            Self::Interrupted => "interrupted",
            Self::NetworkUnavailable => "network-unavailable",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of a backup-creation or sync operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum BackupOutcome {
    Success {
        snapshot: Snapshot,
        duration_ms: u64,
    },
    Failure {
        kind: BackupFailureKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl BackupOutcome {
    pub fn success(snapshot: Snapshot, duration_ms: u64) -> Self {
        Self::Success {
            snapshot,
            duration_ms,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::Failure {
            kind: BackupFailureKind::from_error(err),
            message: err.to_string(),
            cause: render_cause(err),
        }
    }

    /// Outcome for a queued request displaced by a newer one.
    pub fn superseded() -> Self {
        Self::Failure {
            kind: BackupFailureKind::Unknown,
            message: crate::gate::Superseded.to_string(),
            cause: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Result of a restore operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum RestoreOutcome {
    Success {
        items_restored: u64,
        source: Snapshot,
        duration_ms: u64,
    },
    Failure {
        kind: RestoreFailureKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl RestoreOutcome {
    pub fn success(items_restored: u64, source: Snapshot, duration_ms: u64) -> Self {
        Self::Success {
            items_restored,
            source,
            duration_ms,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::Failure {
            kind: RestoreFailureKind::from_error(err),
            message: err.to_string(),
            cause: render_cause(err),
        }
    }

    pub fn superseded() -> Self {
        Self::Failure {
            kind: RestoreFailureKind::Unknown,
            message: crate::gate::Superseded.to_string(),
            cause: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Observable state of remote replication, published through a
/// `tokio::sync::watch` channel on the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// No sync has ever completed on this device.
    Never,
    Synced { last: DateTime<Utc> },
    Syncing { upload_pct: u8, download_pct: u8 },
    Failed { message: String },
}

impl SyncStatus {
    /// Status recomputed at subsystem start from the persisted timestamp.
    pub fn from_last_sync(last: Option<DateTime<Utc>>) -> Self {
        match last {
            Some(last) => Self::Synced { last },
            None => Self::Never,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never synced"),
            Self::Synced { last } => {
                write!(f, "synced {}", last.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            Self::Syncing {
                upload_pct,
                download_pct,
            } => {
                if *download_pct > 0 {
                    write!(f, "syncing (down {download_pct}%)")
                } else {
                    write!(f, "syncing (up {upload_pct}%)")
                }
            }
            Self::Failed { message } => write!(f, "sync failed: {message}"),
        }
    }
}

/// Renders the source chain of an error, outermost cause first.
fn render_cause(err: &Error) -> Option<String> {
    let mut parts = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(": "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, SnapshotLocation, SnapshotName};

    fn sample_snapshot() -> Snapshot {
        let parsed = SnapshotName::parse("tally_v1_20250102_080000.snapshot").unwrap();
        Snapshot::from_name(
            &parsed,
            "tally_v1_20250102_080000.snapshot",
            SnapshotLocation::Local,
            4096,
            "ab".repeat(32),
        )
    }

    #[test]
    fn test_backup_kind_translation() {
        let cases: Vec<(Error, BackupFailureKind)> = vec![
            (Error::storage_full(100, 10), BackupFailureKind::StorageFull),
            (Error::store_locked("/x"), BackupFailureKind::StoreLocked),
            (
                Error::checkpoint_failed("wal"),
                BackupFailureKind::CheckpointFailed,
            ),
            (
                Error::checksum_mismatch("a", "b", "c"),
                BackupFailureKind::ChecksumMismatch,
            ),
            (
                Error::remote_status(503, "unavailable"),
                BackupFailureKind::UploadFailed,
            ),
            (Error::auth_failed("expired"), BackupFailureKind::AuthFailed),
            (
                Error::network_unavailable("offline"),
                BackupFailureKind::NetworkUnavailable,
            ),
            (
                Error::Io(std::io::Error::other("disk pulled")),
                BackupFailureKind::CopyFailed,
            ),
            (Error::settings("bad"), BackupFailureKind::Unknown),
        ];
        for (err, expected) in cases {
            assert_eq!(BackupFailureKind::from_error(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_restore_kind_translation() {
        let cases: Vec<(Error, RestoreFailureKind)> = vec![
            (
                Error::snapshot_not_found("x.snapshot"),
                RestoreFailureKind::NotFound,
            ),
            (
                Error::checksum_mismatch("a", "b", "c"),
                RestoreFailureKind::Corrupted,
            ),
            (
                Error::version_incompatible(9, 3),
                RestoreFailureKind::VersionIncompatible,
            ),
            (
                Error::restore_interrupted("swap failed"),
                RestoreFailureKind::Interrupted,
            ),
            (
                Error::remote_status(500, "boom"),
                RestoreFailureKind::DownloadFailed,
            ),
            (
                Error::network_unavailable("offline"),
                RestoreFailureKind::NetworkUnavailable,
            ),
            (
                Error::migration(1, 2, "step missing"),
                RestoreFailureKind::Unknown,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(RestoreFailureKind::from_error(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let outcome = BackupOutcome::success(sample_snapshot(), 132);
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"result\":\"success\""));
        assert!(json.contains("\"duration_ms\":132"));

        let failure = BackupOutcome::from_error(&Error::storage_full(200, 50));
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"result\":\"failure\""));
        assert!(json.contains("\"kind\":\"storage-full\""));
        // No cause for a leaf error; the field is omitted entirely.
        assert!(!json.contains("\"cause\""));
    }

    #[test]
    fn test_cause_renders_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let outcome = BackupOutcome::from_error(&Error::Io(io));
        match outcome {
            BackupOutcome::Failure { kind, cause, .. } => {
                assert_eq!(kind, BackupFailureKind::CopyFailed);
                assert_eq!(cause.as_deref(), Some("read-only fs"));
            }
            BackupOutcome::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn test_superseded_outcome() {
        let outcome = BackupOutcome::superseded();
        match &outcome {
            BackupOutcome::Failure { kind, message, .. } => {
                assert_eq!(*kind, BackupFailureKind::Unknown);
                assert!(message.contains("superseded"));
            }
            BackupOutcome::Success { .. } => panic!("expected failure"),
        }
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_sync_status_display() {
        assert_eq!(SyncStatus::Never.to_string(), "never synced");
        assert_eq!(
            SyncStatus::Syncing {
                upload_pct: 40,
                download_pct: 0
            }
            .to_string(),
            "syncing (up 40%)"
        );
        assert_eq!(
            SyncStatus::Failed {
                message: "offline".to_string()
            }
            .to_string(),
            "sync failed: offline"
        );
    }

    #[test]
    fn test_sync_status_from_last_sync() {
        assert_eq!(SyncStatus::from_last_sync(None), SyncStatus::Never);
        let ts = Utc::now();
        assert_eq!(
            SyncStatus::from_last_sync(Some(ts)),
            SyncStatus::Synced { last: ts }
        );
    }
}
