//! Index entries and per-unit indexes.

use crate::timestamp::{self, lenient, lenient_opt};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One item inside an indexed sync unit: a favorite or a layout snapshot.
///
/// Deletion is soft: the entry keeps its index row with `deleted_at` set so
/// the deletion can propagate to replicas that have not seen it yet. Expired
/// tombstones are dropped by garbage collection before every merge and
/// before every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Stable identifier, unique within the unit.
    pub id: String,
    /// Display label shown in the configurator.
    pub label: String,
    /// Data file name, relative to the unit's directory.
    pub filename: String,
    /// Creation stamp.
    #[serde(default = "timestamp::epoch", with = "lenient")]
    pub saved_at: DateTime<Utc>,
    /// Last-modify stamp; supersedes `saved_at` for ordering when present.
    #[serde(default, with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Tombstone marker.
    #[serde(default, with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Creates a live entry stamped now, with a fresh id.
    pub fn new(label: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            filename: filename.into(),
            saved_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    /// The stamp used for last-writer-wins ordering.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.saved_at)
    }

    /// Whether this entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this tombstone is older than the retention window.
    pub fn tombstone_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        match self.deleted_at {
            Some(at) => now.signed_duration_since(at) > retention,
            None => false,
        }
    }

    /// Marks the entry deleted, bumping the modify stamp so the tombstone
    /// wins over stale live copies on other replicas.
    pub fn delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Bumps the modify stamp after a local edit.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }
}

/// The persisted index of an indexed sync unit, stored as `index.json`
/// beside the entries' data files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Favorites category or keyboard uid this index belongs to.
    pub key: String,
    pub entries: Vec<Entry>,
}

impl Index {
    /// An empty index for the given key.
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entries: Vec::new(),
        }
    }

    /// Looks up an entry by id.
    pub fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Looks up an entry by id, mutably.
    pub fn entry_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}
