//! The sync orchestrator.
//!
//! `SyncEngine` owns every piece of mutable sync state (the pass lock, the
//! pending-change set, the poller's last-known-remote snapshot, the cached
//! canary validation) as explicit fields behind one handle. There are no
//! process-wide singletons; tests build as many engines as they like and
//! call [`SyncEngine::reset`] between scenarios.

use crate::bundle::bundle_unit;
use crate::error::{SyncError, SyncResult};
use crate::local::LocalTree;
use crate::merge::{merge_entries, merge_settings, SettingsWinner};
use crate::store::{decode_object_name, object_name, RemoteObject, RemoteStore};
use chrono::Utc;
use keyloft_crypto::{open_with_params, seal_with_params, KdfParams, PasswordCache};
use keyloft_types::{Bundle, Index, SyncUnit};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period before a local edit triggers an upload.
    pub debounce_delay: std::time::Duration,
    /// Interval between remote change polls.
    pub poll_interval: std::time::Duration,
    /// How long tombstones are retained before garbage collection.
    pub tombstone_retention: chrono::Duration,
    /// Key derivation parameters for envelope crypto.
    pub kdf: KdfParams,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_delay: std::time::Duration::from_secs(2),
            poll_interval: std::time::Duration::from_secs(30),
            tombstone_retention: chrono::Duration::days(30),
            kdf: KdfParams::default(),
        }
    }
}

/// Direction of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Merge remote state into the local tree.
    Download,
    /// Push local units to the remote store, merging where both exist.
    Upload,
}

/// Which sync units a pass covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every unit.
    All,
    /// Favorites categories only.
    Favorites,
    /// One keyboard's settings and snapshots.
    Keyboard(String),
}

impl SyncScope {
    /// Whether `unit` falls inside this scope.
    pub fn includes(&self, unit: &SyncUnit) -> bool {
        match self {
            Self::All => true,
            Self::Favorites => matches!(unit, SyncUnit::Favorites { .. }),
            Self::Keyboard(uid) => unit.keyboard_uid() == Some(uid.as_str()),
        }
    }
}

/// Progress of a sync pass, as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Syncing,
    Success,
    /// The pass completed but some units failed; see `failed_units`.
    Partial,
    /// The pass could not run at all.
    Error,
}

/// One event on the progress stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub direction: SyncDirection,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_units: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncProgress {
    pub(crate) fn syncing(
        direction: SyncDirection,
        sync_unit: Option<String>,
        current: usize,
        total: usize,
    ) -> Self {
        Self {
            direction,
            status: SyncStatus::Syncing,
            sync_unit,
            current: Some(current),
            total: Some(total),
            failed_units: Vec::new(),
            message: None,
        }
    }

    pub(crate) fn finished(direction: SyncDirection, failed_units: Vec<String>) -> Self {
        let status = if failed_units.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::Partial
        };
        Self {
            direction,
            status,
            sync_unit: None,
            current: None,
            total: None,
            failed_units,
            message: None,
        }
    }

    pub(crate) fn failed(direction: SyncDirection, message: String) -> Self {
        Self {
            direction,
            status: SyncStatus::Error,
            sync_unit: None,
            current: None,
            total: None,
            failed_units: Vec::new(),
            message: Some(message),
        }
    }
}

pub(crate) struct EngineShared {
    pub(crate) config: SyncConfig,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) local: LocalTree,
    pub(crate) passwords: Arc<dyn PasswordCache>,
    /// Pass mutual exclusion. `try_lock`ed, never awaited: triggers that
    /// find it held no-op or reschedule, they do not queue.
    pub(crate) pass_lock: Mutex<()>,
    /// Observation mirror of `pass_lock` for the timers.
    pub(crate) in_progress: AtomicBool,
    /// Whether the canary has decrypted successfully this engine lifetime.
    pub(crate) canary_validated: AtomicBool,
    /// Units edited locally and not yet uploaded.
    pub(crate) pending: StdMutex<HashSet<SyncUnit>>,
    /// Last seen remote stamps by object name; `None` until the first
    /// listing establishes a baseline.
    pub(crate) remote_seen: StdMutex<Option<HashMap<String, String>>>,
    pub(crate) progress_tx: broadcast::Sender<SyncProgress>,
    /// Generation of the latest debounce arm. A timer that wakes to a newer
    /// generation has been superseded and exits without flushing.
    pub(crate) debounce_gen: AtomicU64,
    pub(crate) debounce_timer: StdMutex<Option<JoinHandle<()>>>,
    pub(crate) poll_task: StdMutex<Option<JoinHandle<()>>>,
}

/// Holds the pass lock and keeps the `in_progress` mirror true for exactly
/// as long as the lock is held, including when the owning task is cancelled
/// mid-pass.
pub(crate) struct PassGuard<'a> {
    flag: &'a AtomicBool,
    _lock: tokio::sync::MutexGuard<'a, ()>,
}

impl<'a> PassGuard<'a> {
    pub(crate) fn try_acquire(shared: &'a EngineShared) -> Option<Self> {
        let lock = shared.pass_lock.try_lock().ok()?;
        shared.in_progress.store(true, Ordering::Release);
        Some(Self {
            flag: &shared.in_progress,
            _lock: lock,
        })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The sync engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) shared: Arc<EngineShared>,
}

pub(crate) fn locked<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncEngine {
    /// Creates an engine over the given remote store, local tree root, and
    /// password cache.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        passwords: Arc<dyn PasswordCache>,
        local_root: impl Into<std::path::PathBuf>,
        config: SyncConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(EngineShared {
                config,
                remote,
                local: LocalTree::new(local_root),
                passwords,
                pass_lock: Mutex::new(()),
                in_progress: AtomicBool::new(false),
                canary_validated: AtomicBool::new(false),
                pending: StdMutex::new(HashSet::new()),
                remote_seen: StdMutex::new(None),
                progress_tx,
                debounce_gen: AtomicU64::new(0),
                debounce_timer: StdMutex::new(None),
                poll_task: StdMutex::new(None),
            }),
        }
    }

    /// Subscribes to the progress stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.shared.progress_tx.subscribe()
    }

    /// The local state tree this engine syncs.
    pub fn local(&self) -> &LocalTree {
        &self.shared.local
    }

    /// Whether a sync pass (of any trigger) is currently running.
    pub fn is_sync_in_progress(&self) -> bool {
        self.shared.in_progress.load(Ordering::Acquire)
    }

    /// Whether any local edits are waiting to be uploaded.
    pub fn has_pending_changes(&self) -> bool {
        !locked(&self.shared.pending).is_empty()
    }

    /// Clears every piece of per-session state. Test hook.
    pub fn reset(&self) {
        locked(&self.shared.pending).clear();
        *locked(&self.shared.remote_seen) = None;
        self.shared.canary_validated.store(false, Ordering::Release);
    }

    /// Runs one sync pass over `scope` in `direction`.
    ///
    /// Silently returns when another pass holds the lock; callers that need
    /// to distinguish "ran" from "skipped" check [`is_sync_in_progress`]
    /// first. Returns an error only when the pass could not run at all
    /// (listing failure, canary failure, wrong password); per-unit failures
    /// are isolated and reported through the progress stream instead.
    ///
    /// [`is_sync_in_progress`]: SyncEngine::is_sync_in_progress
    pub async fn execute_sync(
        &self,
        direction: SyncDirection,
        scope: SyncScope,
    ) -> SyncResult<()> {
        let Some(_guard) = PassGuard::try_acquire(&self.shared) else {
            debug!(?direction, "sync already in progress, skipping");
            return Ok(());
        };
        self.run_pass(direction, &scope).await
    }

    async fn run_pass(&self, direction: SyncDirection, scope: &SyncScope) -> SyncResult<()> {
        // Sync is opportunistic: no cached password, no pass.
        let Some(password) = self.shared.passwords.retrieve() else {
            debug!("no cached sync password, skipping pass");
            return Ok(());
        };

        // One listing, threaded through the entire pass.
        let listing = match self.shared.remote.list().await {
            Ok(listing) => listing,
            Err(e) => {
                self.emit(SyncProgress::failed(direction, e.to_string()));
                return Err(e);
            }
        };

        // Scoped syncs trust a cached validation; full passes always check.
        if matches!(scope, SyncScope::All) || !self.canary_validated() {
            if let Err(e) = self.validate_canary(&password, &listing).await {
                self.emit(SyncProgress::failed(direction, e.to_string()));
                return Err(e);
            }
        }

        match direction {
            SyncDirection::Download => self.run_download(&password, &listing, scope).await,
            SyncDirection::Upload => self.run_upload(&password, listing, scope).await,
        }
    }

    async fn run_download(
        &self,
        password: &str,
        listing: &[RemoteObject],
        scope: &SyncScope,
    ) -> SyncResult<()> {
        let targets: Vec<(SyncUnit, &RemoteObject)> = listing
            .iter()
            .filter_map(|obj| decode_object_name(&obj.name).map(|unit| (unit, obj)))
            .filter(|(unit, _)| scope.includes(unit))
            .collect();

        let total = targets.len();
        let mut failed = Vec::new();

        for (i, (unit, obj)) in targets.iter().enumerate() {
            self.emit(SyncProgress::syncing(
                SyncDirection::Download,
                Some(unit.to_string()),
                i + 1,
                total,
            ));
            if let Err(e) = self.pull_unit(password, unit, obj).await {
                warn!(unit = %unit, "download failed: {e}");
                failed.push(unit.to_string());
            }
        }

        self.replace_snapshot(listing);
        self.emit(SyncProgress::finished(SyncDirection::Download, failed));
        Ok(())
    }

    async fn run_upload(
        &self,
        password: &str,
        listing: Vec<RemoteObject>,
        scope: &SyncScope,
    ) -> SyncResult<()> {
        let units: Vec<SyncUnit> = self
            .shared
            .local
            .enumerate_units()
            .await?
            .into_iter()
            .filter(|unit| scope.includes(unit))
            .collect();

        let by_name: HashMap<String, RemoteObject> =
            listing.into_iter().map(|o| (o.name.clone(), o)).collect();

        let total = units.len();
        let mut failed = Vec::new();

        for (i, unit) in units.iter().enumerate() {
            self.emit(SyncProgress::syncing(
                SyncDirection::Upload,
                Some(unit.to_string()),
                i + 1,
                total,
            ));
            let existing = by_name.get(&object_name(unit));
            match self.push_unit(password, unit, existing).await {
                Ok(()) => self.clear_pending(unit),
                Err(e) => {
                    warn!(unit = %unit, "upload failed: {e}");
                    // A later debounce retry picks the unit up again.
                    self.mark_pending(unit.clone());
                    failed.push(unit.to_string());
                }
            }
        }

        // Second listing of the pass: refresh the poller baseline so our own
        // uploads are not re-downloaded as foreign changes.
        match self.shared.remote.list().await {
            Ok(fresh) => self.replace_snapshot(&fresh),
            Err(e) => warn!("post-upload listing failed: {e}"),
        }

        self.emit(SyncProgress::finished(SyncDirection::Upload, failed));
        Ok(())
    }

    /// Downloads and merges one remote object into the local tree. When the
    /// merge leaves the remote side stale, the unit is marked pending so the
    /// next upload pass converges it.
    pub(crate) async fn pull_unit(
        &self,
        password: &str,
        unit: &SyncUnit,
        obj: &RemoteObject,
    ) -> SyncResult<()> {
        let envelope = self.shared.remote.download(&obj.id).await?;
        let plaintext = open_with_params(&envelope, password, &self.shared.config.kdf)?;
        let bundle: Bundle = serde_json::from_slice(&plaintext)?;

        if self.merge_bundle(unit, &bundle).await? {
            self.mark_pending(unit.clone());
            self.arm_debounce();
        }
        Ok(())
    }

    /// Uploads one unit, merging first when it already exists remotely.
    pub(crate) async fn push_unit(
        &self,
        password: &str,
        unit: &SyncUnit,
        existing: Option<&RemoteObject>,
    ) -> SyncResult<()> {
        let now = Utc::now();
        let retention = self.shared.config.tombstone_retention;

        if let Some(obj) = existing {
            let envelope = self.shared.remote.download(&obj.id).await?;
            let plaintext = open_with_params(&envelope, password, &self.shared.config.kdf)?;
            let bundle: Bundle = serde_json::from_slice(&plaintext)?;

            if !self.merge_bundle(unit, &bundle).await? {
                debug!(unit = %unit, "remote already current");
                return Ok(());
            }

            let Some(fresh) = bundle_unit(&self.shared.local, unit, retention, now).await?
            else {
                return Ok(());
            };
            let sealed = seal_with_params(
                &serde_json::to_vec(&fresh)?,
                password,
                &unit.to_string(),
                &self.shared.config.kdf,
            )?;
            self.shared
                .remote
                .upload(&object_name(unit), &sealed, Some(&obj.id))
                .await?;
            info!(unit = %unit, "uploaded merged state");
        } else {
            let Some(fresh) = bundle_unit(&self.shared.local, unit, retention, now).await?
            else {
                debug!(unit = %unit, "nothing on disk, nothing to upload");
                return Ok(());
            };
            let sealed = seal_with_params(
                &serde_json::to_vec(&fresh)?,
                password,
                &unit.to_string(),
                &self.shared.config.kdf,
            )?;
            self.shared
                .remote
                .upload(&object_name(unit), &sealed, None)
                .await?;
            info!(unit = %unit, "uploaded new unit");
        }
        Ok(())
    }

    /// Reconciles a downloaded bundle into the local tree. Returns whether
    /// the remote side needs a follow-up upload.
    async fn merge_bundle(&self, unit: &SyncUnit, bundle: &Bundle) -> SyncResult<bool> {
        match unit {
            SyncUnit::Settings { uid } => {
                let Some(raw) = bundle.files.get(Bundle::SETTINGS_FILE) else {
                    return Err(SyncError::MalformedBundle(format!(
                        "{unit}: missing settings document"
                    )));
                };
                let theirs: serde_json::Value = serde_json::from_str(raw)?;

                match self.shared.local.read_settings(uid).await? {
                    Some(ours) => match merge_settings(&ours, &theirs) {
                        SettingsWinner::Remote => {
                            if ours != theirs {
                                self.shared.local.write_settings(uid, &theirs).await?;
                            }
                            Ok(false)
                        }
                        SettingsWinner::Local => Ok(true),
                    },
                    None => {
                        self.shared.local.write_settings(uid, &theirs).await?;
                        Ok(false)
                    }
                }
            }
            _ => {
                let theirs = match &bundle.index {
                    Some(index) => index.clone(),
                    None => match bundle.files.get(Bundle::INDEX_FILE) {
                        Some(raw) => serde_json::from_str(raw)?,
                        None => {
                            return Err(SyncError::MalformedBundle(format!(
                                "{unit}: missing index"
                            )));
                        }
                    },
                };
                let ours = self
                    .shared
                    .local
                    .read_index(unit)
                    .await?
                    .unwrap_or_else(|| Index::empty(unit.key()));

                let outcome = merge_entries(
                    &ours.entries,
                    &theirs.entries,
                    self.shared.config.tombstone_retention,
                    Utc::now(),
                );

                for filename in &outcome.remote_files_to_copy {
                    match bundle.files.get(filename) {
                        Some(content) => {
                            self.shared
                                .local
                                .write_data_file(unit, filename, content)
                                .await?;
                        }
                        // Missing on the remote replica too; the index row
                        // survives and heals from whichever side has it.
                        None => debug!(unit = %unit, file = %filename, "not in bundle, skipping"),
                    }
                }

                // Deletions win: drop data files for tombstoned rows.
                for entry in outcome.entries.iter().filter(|e| e.is_tombstone()) {
                    self.shared.local.remove_data_file(unit, &entry.filename).await?;
                }

                self.shared
                    .local
                    .write_index(
                        unit,
                        &Index {
                            key: ours.key,
                            entries: outcome.entries,
                        },
                    )
                    .await?;

                Ok(outcome.remote_needs_update)
            }
        }
    }

    pub(crate) fn emit(&self, event: SyncProgress) {
        let _ = self.shared.progress_tx.send(event);
    }

    pub(crate) fn canary_validated(&self) -> bool {
        self.shared.canary_validated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pending(&self, unit: SyncUnit) {
        locked(&self.shared.pending).insert(unit);
    }

    pub(crate) fn clear_pending(&self, unit: &SyncUnit) {
        locked(&self.shared.pending).remove(unit);
    }

    /// A sorted snapshot of the pending set. Units are cleared one by one as
    /// their uploads succeed, never in bulk, so a cancelled flush loses
    /// nothing.
    pub(crate) fn pending_snapshot(&self) -> Vec<SyncUnit> {
        let mut units: Vec<SyncUnit> = locked(&self.shared.pending).iter().cloned().collect();
        units.sort_by_key(|u| u.to_string());
        units
    }

    pub(crate) fn replace_snapshot(&self, listing: &[RemoteObject]) {
        *locked(&self.shared.remote_seen) = Some(stamp_map(listing));
    }
}

pub(crate) fn stamp_map(listing: &[RemoteObject]) -> HashMap<String, String> {
    listing
        .iter()
        .map(|o| (o.name.clone(), o.modified_time.clone()))
        .collect()
}
