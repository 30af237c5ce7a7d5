//! Retention pruning decisions.
//!
//! A pure decision layer: given every snapshot at one location, pick the
//! ones to delete so at most `ceiling` routine snapshots remain. Safety
//! snapshots, named backups, the remote auto slot, and the single most
//! recent snapshot are never chosen, whatever the ceiling says.

use crate::snapshot::{is_auto_slot, Snapshot, SnapshotKind, SnapshotName};
use tracing::debug;

/// How many routine local snapshots survive pruning.
pub const LOCAL_RETAIN_COUNT: usize = 7;

/// How many timestamped remote snapshots survive pruning.
pub const REMOTE_RETAIN_COUNT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    ceiling: usize,
}

impl RetentionPolicy {
    pub fn local() -> Self {
        Self {
            ceiling: LOCAL_RETAIN_COUNT,
        }
    }

    pub fn remote() -> Self {
        Self {
            ceiling: REMOTE_RETAIN_COUNT,
        }
    }

    pub fn with_ceiling(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Picks the snapshots to delete.
    ///
    /// Only routine, non-auto-slot snapshots are candidates. Candidates are
    /// ranked newest first: timestamp, then the same-second counter, then
    /// filename. Everything past the ceiling is returned. The most recent
    /// snapshot overall always survives, so a ceiling of 0 still retains
    /// one.
    pub fn plan<'a>(&self, snapshots: &'a [Snapshot]) -> Vec<&'a Snapshot> {
        let newest_overall = snapshots
            .iter()
            .max_by(|a, b| recency_key(a).cmp(&recency_key(b)))
            .map(|s| s.name.as_str());

        let mut candidates: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| s.kind == SnapshotKind::Routine && !is_auto_slot(&s.name))
            .filter(|s| Some(s.name.as_str()) != newest_overall)
            .collect();
        candidates.sort_by(|a, b| recency_key(b).cmp(&recency_key(a)));

        // The newest overall is excluded from the candidates, so it already
        // occupies one retention slot when it is routine.
        let slots = if newest_overall.is_some() && self.ceiling > 0 {
            let newest_is_candidate_kind = snapshots
                .iter()
                .find(|s| Some(s.name.as_str()) == newest_overall)
                .map(|s| s.kind == SnapshotKind::Routine && !is_auto_slot(&s.name))
                .unwrap_or(false);
            if newest_is_candidate_kind {
                self.ceiling - 1
            } else {
                self.ceiling
            }
        } else {
            self.ceiling
        };

        let doomed: Vec<&Snapshot> = candidates.split_off(slots.min(candidates.len()));
        if !doomed.is_empty() {
            debug!(
                count = doomed.len(),
                ceiling = self.ceiling,
                "retention selected snapshots for pruning"
            );
        }
        doomed
    }
}

/// Ranks snapshots by creation order. The bare name sorts after its
/// countered siblings byte-wise, so the counter has to be compared
/// numerically to recover creation order within a second.
pub(crate) fn recency_key(snapshot: &Snapshot) -> (chrono::DateTime<chrono::Utc>, u32, &str) {
    let counter = SnapshotName::parse(&snapshot.name)
        .map(|n| n.counter)
        .unwrap_or(0);
    (snapshot.created_at, counter, snapshot.name.as_str())
}
