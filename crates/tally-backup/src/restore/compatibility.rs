//! Schema-version gating for restores.
//!
//! A snapshot written at schema N can be restored onto a store at schema M
//! iff `N <= M`: older data migrates forward, newer data has no downgrade
//! path.

use tally_core::{Error, Result};

/// Whether a snapshot at `snapshot_version` may replace a store at
/// `current_version`.
pub fn is_compatible(snapshot_version: u32, current_version: u32) -> bool {
    snapshot_version <= current_version
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCompatibility {
    pub snapshot_version: u32,
    pub current_version: u32,
}

impl VersionCompatibility {
    pub fn check(snapshot_version: u32, current_version: u32) -> Self {
        Self {
            snapshot_version,
            current_version,
        }
    }

    pub fn compatible(&self) -> bool {
        is_compatible(self.snapshot_version, self.current_version)
    }

    pub fn needs_migration(&self) -> bool {
        self.compatible() && self.snapshot_version < self.current_version
    }

    /// Errors out on an incompatible pairing; passes through otherwise.
    pub fn ensure(&self) -> Result<()> {
        if self.compatible() {
            Ok(())
        } else {
            Err(Error::version_incompatible(
                self.snapshot_version,
                self.current_version,
            ))
        }
    }

    pub fn message(&self) -> String {
        if !self.compatible() {
            format!(
                "snapshot schema v{} is newer than the store's v{}; downgrade is not supported",
                self.snapshot_version, self.current_version
            )
        } else if self.needs_migration() {
            format!(
                "snapshot schema v{} will be migrated to v{}",
                self.snapshot_version, self.current_version
            )
        } else {
            format!("snapshot schema v{} matches the store", self.snapshot_version)
        }
    }
}
