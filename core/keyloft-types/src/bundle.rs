//! Transport bundles: the plaintext payload packed into envelopes.

use crate::Index;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Payload kind carried by a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    /// A favorites category.
    Favorite,
    /// Keyboard layout snapshots.
    Layout,
    /// A keyboard settings document.
    Settings,
}

/// Everything needed to reconstruct one sync unit on another replica.
///
/// Built fresh from the local tree on every upload and reconciled back onto
/// it on every download. `files` maps data-file names to their contents and
/// always includes the serialized index (`index.json`) for indexed units or
/// the settings document (`settings.json`) for settings units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "type")]
    pub kind: BundleKind,
    /// Favorites category or keyboard uid.
    pub key: String,
    /// Parsed index for indexed units; absent for settings bundles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Index>,
    pub files: BTreeMap<String, String>,
}

impl Bundle {
    /// Name of the serialized index inside `files`.
    pub const INDEX_FILE: &'static str = "index.json";
    /// Name of the settings document inside `files`.
    pub const SETTINGS_FILE: &'static str = "settings.json";
}
