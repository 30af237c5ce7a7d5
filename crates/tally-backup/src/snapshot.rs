//! Snapshot metadata and the filename codec.
//!
//! Snapshot files are named `tally_v{schema}_{yyyyMMdd}_{HHmmss}.snapshot`.
//! The creation timestamp and schema version are recovered by parsing the
//! name, so ordering stays stable without any extra metadata file. Repeated
//! snapshots within one second get a `-{n}` counter on the time token.
//! Safety snapshots append `_prerestore` to the stem; named backups append a
//! user-supplied label. The remote auto slot uses the fixed object name
//! [`AUTO_SLOT_NAME`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::{Error, Result};
use uuid::Uuid;

/// Prefix of every snapshot filename.
pub const FILE_PREFIX: &str = "tally_";

/// Extension of snapshot files (without the dot).
pub const FILE_EXTENSION: &str = "snapshot";

/// Stem suffix marking a pre-restore safety snapshot.
pub const SAFETY_SUFFIX: &str = "prerestore";

/// Fixed object name the scheduled sync overwrites.
pub const AUTO_SLOT_NAME: &str = "tally_auto.snapshot";

/// Timestamp layout inside the filename.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where a snapshot lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotLocation {
    Local,
    Remote,
}

impl SnapshotLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotLocation::Local => "local",
            SnapshotLocation::Remote => "remote",
        }
    }
}

impl fmt::Display for SnapshotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a snapshot as seen by listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotStatus {
    Available,
    Uploading,
    Downloading,
    Failed,
    Corrupted,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Available => "available",
            SnapshotStatus::Uploading => "uploading",
            SnapshotStatus::Downloading => "downloading",
            SnapshotStatus::Failed => "failed",
            SnapshotStatus::Corrupted => "corrupted",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced a snapshot, derived from the filename suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotKind {
    /// Ordinary backup, subject to retention.
    Routine,

    /// Pre-restore safety copy, never pruned by retention.
    Safety,

    /// Manual backup carrying a user label, exempt from remote retention.
    Named { label: String },
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Routine => "routine",
            SnapshotKind::Safety => "safety",
            SnapshotKind::Named { .. } => "named",
        }
    }

    /// True for kinds that retention must never delete.
    pub fn retention_exempt(&self) -> bool {
        !matches!(self, SnapshotKind::Routine)
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a user-supplied backup label.
///
/// Labels become filename fragments, so they are restricted to ASCII
/// alphanumerics, `-` and `_`, and may not collide with the safety suffix.
pub fn validate_label(label: &str) -> Result<()> {
    let valid_chars = !label.is_empty()
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid_chars || label == SAFETY_SUFFIX || label.starts_with('_') {
        return Err(Error::invalid_snapshot_name(format!(
            "invalid backup label: {label:?}"
        )));
    }
    Ok(())
}

/// The decoded form of a snapshot filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,

    /// Same-second disambiguation counter; 0 means no counter token.
    pub counter: u32,

    pub kind: SnapshotKind,
}

impl SnapshotName {
    pub fn new(schema_version: u32, created_at: DateTime<Utc>, kind: SnapshotKind) -> Self {
        Self {
            schema_version,
            created_at,
            counter: 0,
            kind,
        }
    }

    pub fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    /// Renders the filename, including extension.
    pub fn file_name(&self) -> String {
        let mut stem = format!(
            "{}v{}_{}",
            FILE_PREFIX,
            self.schema_version,
            self.created_at.format(TIMESTAMP_FORMAT)
        );
        if self.counter > 0 {
            stem.push_str(&format!("-{}", self.counter));
        }
        match &self.kind {
            SnapshotKind::Routine => {}
            SnapshotKind::Safety => {
                stem.push('_');
                stem.push_str(SAFETY_SUFFIX);
            }
            SnapshotKind::Named { label } => {
                stem.push('_');
                stem.push_str(label);
            }
        }
        format!("{stem}.{FILE_EXTENSION}")
    }

    /// Decodes a snapshot filename.
    ///
    /// The auto slot name is not timestamped and does not parse here; callers
    /// dealing with remote listings resolve it through its checksum companion
    /// first.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || Error::invalid_snapshot_name(name);

        let stem = name
            .strip_suffix(&format!(".{FILE_EXTENSION}"))
            .ok_or_else(invalid)?;
        let rest = stem.strip_prefix(FILE_PREFIX).ok_or_else(invalid)?;

        let mut parts = rest.split('_');
        let version_token = parts.next().ok_or_else(invalid)?;
        let date_token = parts.next().ok_or_else(invalid)?;
        let time_token = parts.next().ok_or_else(invalid)?;
        let suffix = parts.collect::<Vec<_>>().join("_");

        let schema_version: u32 = version_token
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or_else(invalid)?;

        let (time_part, counter) = match time_token.split_once('-') {
            Some((t, c)) => (t, c.parse::<u32>().map_err(|_| invalid())?),
            None => (time_token, 0),
        };

        let naive = NaiveDateTime::parse_from_str(
            &format!("{date_token}_{time_part}"),
            TIMESTAMP_FORMAT,
        )
        .map_err(|_| invalid())?;

        let kind = if suffix.is_empty() {
            SnapshotKind::Routine
        } else if suffix == SAFETY_SUFFIX {
            SnapshotKind::Safety
        } else {
            SnapshotKind::Named { label: suffix }
        };

        Ok(Self {
            schema_version,
            created_at: naive.and_utc(),
            counter,
            kind,
        })
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// True if `name` looks like a snapshot file (prefix and extension match).
pub fn is_snapshot_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(&format!(".{FILE_EXTENSION}"))
}

/// True for the fixed auto-slot object name.
pub fn is_auto_slot(name: &str) -> bool {
    name == AUTO_SLOT_NAME
}

/// A point-in-time, checksum-verified copy of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier for this listing entry.
    pub id: Uuid,

    /// File or object name, e.g. `tally_v3_20250102_080000.snapshot`.
    pub name: String,

    pub location: SnapshotLocation,

    /// Creation time recovered from the name.
    pub created_at: DateTime<Utc>,

    pub size_bytes: u64,

    /// Schema version of the store at creation time.
    pub schema_version: u32,

    /// Hex-encoded SHA-256 of the snapshot bytes.
    pub checksum: String,

    pub status: SnapshotStatus,

    pub kind: SnapshotKind,
}

impl Snapshot {
    /// Builds a snapshot record from a decoded name plus observed file facts.
    pub fn from_name(
        parsed: &SnapshotName,
        name: impl Into<String>,
        location: SnapshotLocation,
        size_bytes: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            location,
            created_at: parsed.created_at,
            size_bytes,
            schema_version: parsed.schema_version,
            checksum: checksum.into(),
            status: SnapshotStatus::Available,
            kind: parsed.kind.clone(),
        }
    }

    /// Human-readable size.
    pub fn human_size(&self) -> String {
        tally_core::human_bytes(self.size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_routine_name_round_trip() {
        let name = SnapshotName::new(3, ts(2025, 1, 2, 8, 30, 15), SnapshotKind::Routine);
        assert_eq!(name.file_name(), "tally_v3_20250102_083015.snapshot");

        let parsed = SnapshotName::parse("tally_v3_20250102_083015.snapshot").unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_safety_suffix_classifies_kind() {
        let parsed = SnapshotName::parse("tally_v7_20250710_120000_prerestore.snapshot").unwrap();
        assert_eq!(parsed.kind, SnapshotKind::Safety);
        assert_eq!(parsed.schema_version, 7);
        assert!(parsed.kind.retention_exempt());
    }

    #[test]
    fn test_named_suffix_keeps_underscores() {
        let parsed =
            SnapshotName::parse("tally_v2_20250101_090000_before_vacation.snapshot").unwrap();
        assert_eq!(
            parsed.kind,
            SnapshotKind::Named {
                label: "before_vacation".to_string()
            }
        );

        // And it renders back to the same name.
        assert_eq!(
            parsed.file_name(),
            "tally_v2_20250101_090000_before_vacation.snapshot"
        );
    }

    #[test]
    fn test_same_second_counter() {
        let base = SnapshotName::new(1, ts(2025, 3, 4, 10, 0, 0), SnapshotKind::Routine);
        let second = base.clone().with_counter(2);
        assert_eq!(second.file_name(), "tally_v1_20250304_100000-2.snapshot");

        let parsed = SnapshotName::parse("tally_v1_20250304_100000-2.snapshot").unwrap();
        assert_eq!(parsed.counter, 2);
        assert_eq!(parsed.created_at, base.created_at);
    }

    #[test]
    fn test_counter_with_safety_suffix() {
        let name = SnapshotName::new(4, ts(2025, 5, 6, 23, 59, 59), SnapshotKind::Safety)
            .with_counter(1);
        let rendered = name.file_name();
        assert_eq!(rendered, "tally_v4_20250506_235959-1_prerestore.snapshot");
        assert_eq!(SnapshotName::parse(&rendered).unwrap(), name);
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        for bad in [
            "notes.txt",
            "tally_.snapshot",
            "tally_v1.snapshot",
            "tally_v1_20250101.snapshot",
            "tally_vX_20250101_120000.snapshot",
            "tally_v1_20251301_120000.snapshot", // month 13
            "tally_v1_20250101_250000.snapshot", // hour 25
            "tally_v1_20250101_120000.db",
            "tally_auto.snapshot", // auto slot resolves via its companion
        ] {
            assert!(
                SnapshotName::parse(bad).is_err(),
                "expected parse failure for {bad}"
            );
        }
    }

    #[test]
    fn test_lexical_order_matches_chronological_order() {
        let names = [
            SnapshotName::new(1, ts(2024, 12, 31, 23, 59, 59), SnapshotKind::Routine),
            SnapshotName::new(1, ts(2025, 1, 1, 0, 0, 0), SnapshotKind::Routine),
            SnapshotName::new(1, ts(2025, 1, 1, 0, 0, 1), SnapshotKind::Routine),
            SnapshotName::new(1, ts(2025, 6, 30, 12, 0, 0), SnapshotKind::Routine),
        ];
        let rendered: Vec<String> = names.iter().map(|n| n.file_name()).collect();
        let mut sorted = rendered.clone();
        sorted.sort();
        assert_eq!(rendered, sorted);
    }

    #[test]
    fn test_validate_label() {
        validate_label("before-vacation").unwrap();
        validate_label("migration_2025").unwrap();

        assert!(validate_label("").is_err());
        assert!(validate_label("prerestore").is_err());
        assert!(validate_label("has space").is_err());
        assert!(validate_label("dot.dot").is_err());
        assert!(validate_label("_leading").is_err());
    }

    #[test]
    fn test_is_snapshot_file() {
        assert!(is_snapshot_file("tally_v1_20250101_120000.snapshot"));
        assert!(is_snapshot_file(AUTO_SLOT_NAME));
        assert!(!is_snapshot_file("tally_v1_20250101_120000.snapshot.sha256"));
        assert!(!is_snapshot_file("other_v1_20250101_120000.snapshot"));
    }

    #[test]
    fn test_snapshot_from_name() {
        let parsed = SnapshotName::parse("tally_v5_20250801_070000.snapshot").unwrap();
        let snapshot = Snapshot::from_name(
            &parsed,
            "tally_v5_20250801_070000.snapshot",
            SnapshotLocation::Local,
            2048,
            "ab".repeat(32),
        );

        assert_eq!(snapshot.schema_version, 5);
        assert_eq!(snapshot.kind, SnapshotKind::Routine);
        assert_eq!(snapshot.status, SnapshotStatus::Available);
        assert_eq!(snapshot.created_at, parsed.created_at);
        assert_eq!(snapshot.human_size(), "2.00 KB");
    }

    #[test]
    fn test_snapshot_serializes_for_outcome_payloads() {
        let parsed = SnapshotName::parse("tally_v5_20250801_070000.snapshot").unwrap();
        let snapshot = Snapshot::from_name(
            &parsed,
            "tally_v5_20250801_070000.snapshot",
            SnapshotLocation::Remote,
            10,
            "cd".repeat(32),
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"remote\""));
        assert!(json.contains("tally_v5_20250801_070000.snapshot"));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
