//! Folder-backed remote store.
//!
//! Treats a locally-mounted cloud drive folder (iCloud Drive, a Drive or
//! Dropbox mount) as the remote object store: the provider's own client
//! moves the bytes, we just read and write envelope files. Object ids are
//! stable hashes of the file path; modification stamps come from file
//! metadata.

use crate::error::{SyncError, SyncResult};
use crate::store::{RemoteObject, RemoteStore};
use async_trait::async_trait;
use keyloft_crypto::Envelope;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Remote store backed by a synced folder on the local filesystem.
pub struct FolderStore {
    root: PathBuf,
}

impl FolderStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The folder holding the envelope files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(&self) -> SyncResult<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).await?;
            info!("created sync folder {:?}", self.root);
        }
        Ok(())
    }

    /// Generates a deterministic object id from a path.
    fn path_to_id(path: &Path) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        path.to_string_lossy().hash(&mut hasher);
        format!("obj-{:x}", hasher.finish())
    }

    async fn object_for(&self, path: PathBuf) -> SyncResult<RemoteObject> {
        let metadata = fs::metadata(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let modified: chrono::DateTime<chrono::Utc> = metadata
            .modified()
            .map(Into::into)
            .unwrap_or_else(|_| chrono::Utc::now());

        Ok(RemoteObject {
            id: Self::path_to_id(&path),
            name,
            modified_time: modified.to_rfc3339(),
        })
    }

    async fn find_by_id(&self, id: &str) -> SyncResult<Option<PathBuf>> {
        self.ensure_root().await?;
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.is_file() && Self::path_to_id(&path) == id {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl RemoteStore for FolderStore {
    fn provider_name(&self) -> &'static str {
        "folder"
    }

    async fn list(&self) -> SyncResult<Vec<RemoteObject>> {
        self.ensure_root().await?;

        let mut objects = Vec::new();
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();

            // Skip directories and the provider's own hidden bookkeeping.
            if path.is_dir()
                || path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(false)
            {
                continue;
            }

            match self.object_for(path).await {
                Ok(object) => objects.push(object),
                Err(e) => warn!("skipping unreadable object: {e}"),
            }
        }

        Ok(objects)
    }

    async fn download(&self, id: &str) -> SyncResult<Envelope> {
        let Some(path) = self.find_by_id(id).await? else {
            return Err(SyncError::Remote(format!("object not found: {id}")));
        };

        debug!("downloading {:?}", path);
        let raw = fs::read(&path).await?;
        let envelope = serde_json::from_slice(&raw)?;
        Ok(envelope)
    }

    async fn upload(
        &self,
        name: &str,
        envelope: &Envelope,
        existing_id: Option<&str>,
    ) -> SyncResult<String> {
        self.ensure_root().await?;

        // Names are flat and deterministic, so an existing id always maps to
        // the same named file; keep the overwrite path anyway in case an old
        // client left an object under a stale name.
        let path = match existing_id {
            Some(id) => self
                .find_by_id(id)
                .await?
                .unwrap_or_else(|| self.root.join(name)),
            None => self.root.join(name),
        };

        let raw = serde_json::to_vec_pretty(envelope)?;
        fs::write(&path, raw).await?;
        debug!("uploaded {:?} ({})", path, envelope.sync_unit);

        Ok(Self::path_to_id(&path))
    }
}
