//! Sync unit identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One independently-synchronized logical collection.
///
/// Each unit maps 1:1 to a single remote object and a single location in the
/// local state tree. Units never read each other's data during a merge, so a
/// failure in one unit cannot corrupt another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SyncUnit {
    /// One favorites category (`favorites/{kind}`), e.g. saved macros.
    Favorites { kind: String },
    /// One keyboard's settings document (`keyboards/{uid}/settings`).
    Settings { uid: String },
    /// One keyboard's layout snapshots (`keyboards/{uid}/snapshots`).
    Snapshots { uid: String },
}

impl SyncUnit {
    /// A favorites-category unit.
    pub fn favorites(kind: impl Into<String>) -> Self {
        Self::Favorites { kind: kind.into() }
    }

    /// A per-keyboard settings unit.
    pub fn settings(uid: impl Into<String>) -> Self {
        Self::Settings { uid: uid.into() }
    }

    /// A per-keyboard snapshots unit.
    pub fn snapshots(uid: impl Into<String>) -> Self {
        Self::Snapshots { uid: uid.into() }
    }

    /// Whether this unit carries an index of entries (favorites, snapshots)
    /// rather than a single settings document.
    pub fn is_indexed(&self) -> bool {
        !matches!(self, Self::Settings { .. })
    }

    /// The keyboard this unit belongs to, if any.
    pub fn keyboard_uid(&self) -> Option<&str> {
        match self {
            Self::Favorites { .. } => None,
            Self::Settings { uid } | Self::Snapshots { uid } => Some(uid),
        }
    }

    /// The key stored in the unit's index: the favorites category or the
    /// keyboard uid.
    pub fn key(&self) -> &str {
        match self {
            Self::Favorites { kind } => kind,
            Self::Settings { uid } | Self::Snapshots { uid } => uid,
        }
    }
}

impl fmt::Display for SyncUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Favorites { kind } => write!(f, "favorites/{kind}"),
            Self::Settings { uid } => write!(f, "keyboards/{uid}/settings"),
            Self::Snapshots { uid } => write!(f, "keyboards/{uid}/snapshots"),
        }
    }
}

impl FromStr for SyncUnit {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::Error::InvalidUnit(s.to_string());
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["favorites", kind] if !kind.is_empty() => Ok(Self::favorites(*kind)),
            ["keyboards", uid, "settings"] if !uid.is_empty() => Ok(Self::settings(*uid)),
            ["keyboards", uid, "snapshots"] if !uid.is_empty() => Ok(Self::snapshots(*uid)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for SyncUnit {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SyncUnit> for String {
    fn from(unit: SyncUnit) -> Self {
        unit.to_string()
    }
}
