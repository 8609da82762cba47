//! Packing sync units into transport bundles.
//!
//! A bundle is built fresh from local disk on every upload; there is no
//! cached copy to go stale. Tombstone garbage collection runs before
//! packing, so an upload can never resurrect a tombstone that already
//! expired locally.

use crate::error::SyncResult;
use crate::local::LocalTree;
use chrono::{DateTime, Duration, Utc};
use keyloft_types::{Bundle, BundleKind, Index, SyncUnit};
use std::collections::BTreeMap;
use tracing::debug;

/// Packs one sync unit from local disk into a bundle.
///
/// Returns `None` when the unit has nothing on disk (nothing to upload).
/// A data file referenced by the index but missing from disk is skipped
/// silently: the index row survives and the file is restored from another
/// replica on a later merge.
pub async fn bundle_unit(
    local: &LocalTree,
    unit: &SyncUnit,
    retention: Duration,
    now: DateTime<Utc>,
) -> SyncResult<Option<Bundle>> {
    match unit {
        SyncUnit::Settings { uid } => {
            let Some(doc) = local.read_settings(uid).await? else {
                return Ok(None);
            };
            let mut files = BTreeMap::new();
            files.insert(
                Bundle::SETTINGS_FILE.to_string(),
                serde_json::to_string(&doc)?,
            );
            Ok(Some(Bundle {
                kind: BundleKind::Settings,
                key: uid.clone(),
                index: None,
                files,
            }))
        }
        _ => {
            let Some(index) = local.read_index(unit).await? else {
                return Ok(None);
            };
            let index = Index {
                key: index.key,
                entries: crate::merge::gc_tombstones(&index.entries, retention, now),
            };

            let mut files = BTreeMap::new();
            for entry in index.entries.iter().filter(|e| !e.is_tombstone()) {
                match local.read_data_file(unit, &entry.filename).await? {
                    Some(content) => {
                        files.insert(entry.filename.clone(), content);
                    }
                    None => {
                        debug!(unit = %unit, file = %entry.filename, "data file missing, skipping");
                    }
                }
            }
            files.insert(Bundle::INDEX_FILE.to_string(), serde_json::to_string(&index)?);

            let kind = match unit {
                SyncUnit::Favorites { .. } => BundleKind::Favorite,
                _ => BundleKind::Layout,
            };
            Ok(Some(Bundle {
                kind,
                key: unit.key().to_string(),
                index: Some(index),
                files,
            }))
        }
    }
}
