//! Error types for tally-core

use thiserror::Error;

/// Result type alias using tally-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the backup subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough free space on the device for a safe snapshot copy
    #[error("Insufficient storage: need {required} bytes free, only {available} available")]
    StorageFull { required: u64, available: u64 },

    /// The live store is exclusively locked by another writer
    #[error("Store is locked by another writer: {path}")]
    StoreLocked { path: String },

    /// Operation attempted on a store whose handle has been released
    #[error("Store is closed: {path}")]
    StoreClosed { path: String },

    /// The store failed to flush pending writes into its primary file
    #[error("Checkpoint failed: {message}")]
    CheckpointFailed { message: String },

    /// Snapshot not found in the requested location
    #[error("Snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    /// Snapshot bytes no longer match the recorded digest
    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Filename does not follow the snapshot naming scheme
    #[error("Invalid snapshot name: {name}")]
    InvalidSnapshotName { name: String },

    /// Snapshot schema version is newer than the running application
    #[error("Snapshot schema version {snapshot} is newer than current version {current}")]
    VersionIncompatible { snapshot: u32, current: u32 },

    /// Restore failed after the swap began and was rolled back
    #[error("Restore interrupted and rolled back: {message}")]
    RestoreInterrupted { message: String },

    /// Remote object store rejected or failed a request
    #[error("Remote store error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Remote { status: Option<u16>, message: String },

    /// No credential, or the credential was rejected
    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    /// Network is unreachable or the request never left the device
    #[error("Network unavailable: {message}")]
    NetworkUnavailable { message: String },

    /// Settings could not be loaded or persisted
    #[error("Settings error: {message}")]
    Settings { message: String },

    /// Schema migration after a restore swap failed
    #[error("Migration from schema v{from} to v{to} failed: {message}")]
    Migration { from: u32, to: u32, message: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a storage-full error
    pub fn storage_full(required: u64, available: u64) -> Self {
        Self::StorageFull {
            required,
            available,
        }
    }

    /// Create a store-locked error
    pub fn store_locked(path: impl Into<String>) -> Self {
        Self::StoreLocked { path: path.into() }
    }

    /// Create a store-closed error
    pub fn store_closed(path: impl Into<String>) -> Self {
        Self::StoreClosed { path: path.into() }
    }

    /// Create a checkpoint-failed error
    pub fn checkpoint_failed(message: impl Into<String>) -> Self {
        Self::CheckpointFailed {
            message: message.into(),
        }
    }

    /// Create a snapshot-not-found error
    pub fn snapshot_not_found(name: impl Into<String>) -> Self {
        Self::SnapshotNotFound { name: name.into() }
    }

    /// Create a checksum-mismatch error
    pub fn checksum_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid-snapshot-name error
    pub fn invalid_snapshot_name(name: impl Into<String>) -> Self {
        Self::InvalidSnapshotName { name: name.into() }
    }

    /// Create a version-incompatible error
    pub fn version_incompatible(snapshot: u32, current: u32) -> Self {
        Self::VersionIncompatible { snapshot, current }
    }

    /// Create a restore-interrupted error
    pub fn restore_interrupted(message: impl Into<String>) -> Self {
        Self::RestoreInterrupted {
            message: message.into(),
        }
    }

    /// Create a remote error with an HTTP status
    pub fn remote_status(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a remote error without a status (transport-level failure)
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthFailed {
            message: message.into(),
        }
    }

    /// Create a network-unavailable error
    pub fn network_unavailable(message: impl Into<String>) -> Self {
        Self::NetworkUnavailable {
            message: message.into(),
        }
    }

    /// Create a settings error
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    /// Create a migration error
    pub fn migration(from: u32, to: u32, message: impl Into<String>) -> Self {
        Self::Migration {
            from,
            to,
            message: message.into(),
        }
    }
}
