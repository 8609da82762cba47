//! The on-disk state tree the configurator edits.
//!
//! Layout, relative to the app data directory:
//!
//! ```text
//! favorites/<kind>/index.json        + one data file per entry
//! keyboards/<uid>/settings.json
//! keyboards/<uid>/snapshots/index.json  + one data file per entry
//! ```
//!
//! The engine reads and writes through this narrow wrapper only. Entry
//! filenames are validated before every access: an index downloaded from the
//! remote store must never be able to name a file outside its own unit
//! directory.

use crate::error::{SyncError, SyncResult};
use keyloft_types::{Bundle, Index, SyncUnit};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Accessor for the local state tree.
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    /// Wraps the state tree rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The tree's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unit_dir(&self, unit: &SyncUnit) -> PathBuf {
        match unit {
            SyncUnit::Favorites { kind } => self.root.join("favorites").join(kind),
            SyncUnit::Settings { uid } => self.root.join("keyboards").join(uid),
            SyncUnit::Snapshots { uid } => {
                self.root.join("keyboards").join(uid).join("snapshots")
            }
        }
    }

    fn settings_path(&self, uid: &str) -> PathBuf {
        self.root
            .join("keyboards")
            .join(uid)
            .join(Bundle::SETTINGS_FILE)
    }

    fn index_path(&self, unit: &SyncUnit) -> PathBuf {
        self.unit_dir(unit).join(Bundle::INDEX_FILE)
    }

    fn data_path(&self, unit: &SyncUnit, filename: &str) -> SyncResult<PathBuf> {
        validate_filename(filename)?;
        Ok(self.unit_dir(unit).join(filename))
    }

    /// Every sync unit present on disk, discovered by scanning the tree.
    /// Sorted for deterministic pass ordering.
    pub async fn enumerate_units(&self) -> SyncResult<Vec<SyncUnit>> {
        let mut units = Vec::new();

        for kind in list_subdirs(&self.root.join("favorites")).await? {
            let unit = SyncUnit::favorites(&kind);
            if self.index_path(&unit).exists() {
                units.push(unit);
            }
        }

        for uid in list_subdirs(&self.root.join("keyboards")).await? {
            if self.settings_path(&uid).exists() {
                units.push(SyncUnit::settings(&uid));
            }
            let snapshots = SyncUnit::snapshots(&uid);
            if self.index_path(&snapshots).exists() {
                units.push(snapshots);
            }
        }

        units.sort_by_key(|u| u.to_string());
        Ok(units)
    }

    /// Reads a unit's index; `None` if it does not exist yet.
    pub async fn read_index(&self, unit: &SyncUnit) -> SyncResult<Option<Index>> {
        let path = self.index_path(unit);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Writes a unit's index, creating the directory as needed.
    pub async fn write_index(&self, unit: &SyncUnit, index: &Index) -> SyncResult<()> {
        let path = self.index_path(unit);
        write_file(&path, &serde_json::to_vec_pretty(index)?).await
    }

    /// Reads a keyboard's settings document; `None` if absent.
    pub async fn read_settings(&self, uid: &str) -> SyncResult<Option<serde_json::Value>> {
        let path = self.settings_path(uid);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Writes a keyboard's settings document.
    pub async fn write_settings(
        &self,
        uid: &str,
        doc: &serde_json::Value,
    ) -> SyncResult<()> {
        let path = self.settings_path(uid);
        write_file(&path, &serde_json::to_vec_pretty(doc)?).await
    }

    /// Reads an entry's data file; `None` if missing.
    pub async fn read_data_file(
        &self,
        unit: &SyncUnit,
        filename: &str,
    ) -> SyncResult<Option<String>> {
        let path = self.data_path(unit, filename)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path).await?))
    }

    /// Writes an entry's data file.
    pub async fn write_data_file(
        &self,
        unit: &SyncUnit,
        filename: &str,
        content: &str,
    ) -> SyncResult<()> {
        let path = self.data_path(unit, filename)?;
        write_file(&path, content.as_bytes()).await
    }

    /// Removes an entry's data file. A missing file is not an error.
    pub async fn remove_data_file(&self, unit: &SyncUnit, filename: &str) -> SyncResult<()> {
        let path = self.data_path(unit, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await?;
    Ok(())
}

async fn list_subdirs(dir: &Path) -> SyncResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.is_dir() {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Rejects entry filenames that could escape the unit directory or clobber
/// the unit's own bookkeeping files.
fn validate_filename(name: &str) -> SyncResult<()> {
    let reserved = name == Bundle::INDEX_FILE || name == Bundle::SETTINGS_FILE;
    let traversal = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\');
    if reserved || traversal {
        return Err(SyncError::InvalidFilename(name.to_string()));
    }
    Ok(())
}
