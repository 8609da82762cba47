//! Entry-list merging: set union with per-id last-writer-wins.
//!
//! Two replicas edit the same unit independently; neither is authoritative.
//! The merge keeps every id either side knows about, resolves both-sides
//! conflicts by effective timestamp, and lets tombstones travel like any
//! other write so deletions propagate. Expired tombstones are dropped from
//! both inputs before comparison; otherwise a tombstone that expired on one
//! replica but not the other would force an upload on every pass, forever.

use chrono::{DateTime, Duration, Utc};
use keyloft_types::timestamp::settings_stamp;
use keyloft_types::Entry;
use std::collections::HashMap;

/// Result of merging a local and a remote entry list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged entry list, to be written back as the unit's index.
    pub entries: Vec<Entry>,
    /// Data files whose remote copy won and must be copied onto local disk.
    pub remote_files_to_copy: Vec<String>,
    /// Whether the merged set differs from the remote input: local had
    /// something remote lacked, or local won a conflict. Triggers a
    /// follow-up upload.
    pub remote_needs_update: bool,
}

/// Drops tombstones older than the retention window.
pub fn gc_tombstones(entries: &[Entry], retention: Duration, now: DateTime<Utc>) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| !e.tombstone_expired(retention, now))
        .cloned()
        .collect()
}

/// Merges two entry lists for the same sync unit.
///
/// Ids present on one side only are kept unchanged. Ids present on both
/// sides keep whichever entry has the larger effective timestamp
/// (`updated_at ?? saved_at`); label, filename, and tombstone state travel
/// together. Ties favor the remote entry so repeated no-op merges converge
/// instead of oscillating.
pub fn merge_entries(
    local: &[Entry],
    remote: &[Entry],
    retention: Duration,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let local = gc_tombstones(local, retention, now);
    let remote = gc_tombstones(remote, retention, now);

    let local_by_id: HashMap<&str, &Entry> = local.iter().map(|e| (e.id.as_str(), e)).collect();
    let remote_ids: HashMap<&str, ()> = remote.iter().map(|e| (e.id.as_str(), ())).collect();

    let mut entries = Vec::with_capacity(local.len().max(remote.len()));
    let mut remote_files_to_copy = Vec::new();
    let mut remote_needs_update = false;

    // Remote order first so every replica settles on the same layout.
    for theirs in &remote {
        match local_by_id.get(theirs.id.as_str()) {
            Some(ours) if ours.effective_at() > theirs.effective_at() => {
                entries.push((*ours).clone());
                remote_needs_update = true;
            }
            _ => {
                if !theirs.is_tombstone() {
                    remote_files_to_copy.push(theirs.filename.clone());
                }
                entries.push(theirs.clone());
            }
        }
    }

    for ours in &local {
        if !remote_ids.contains_key(ours.id.as_str()) {
            entries.push(ours.clone());
            remote_needs_update = true;
        }
    }

    MergeOutcome {
        entries,
        remote_files_to_copy,
        remote_needs_update,
    }
}

/// Which side of a whole-document comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsWinner {
    Local,
    Remote,
}

/// Single-document last-writer-wins for settings units.
///
/// Stamps are parsed leniently: a corrupt or missing `_updatedAt` orders as
/// the epoch, so a malformed document always loses to a well-formed one and
/// never fails the merge. Ties favor the remote document.
pub fn merge_settings(local: &serde_json::Value, remote: &serde_json::Value) -> SettingsWinner {
    if settings_stamp(local) > settings_stamp(remote) {
        SettingsWinner::Local
    } else {
        SettingsWinner::Remote
    }
}
