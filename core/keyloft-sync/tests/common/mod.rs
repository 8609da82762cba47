//! Shared test fixtures: an in-memory remote store with failure injection
//! and call counters, plus engine builders over a temp state tree.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keyloft_crypto::{seal_with_params, Envelope, KdfParams, MemoryPasswordCache};
use keyloft_sync::{
    object_name, LocalTree, RemoteObject, RemoteStore, SyncConfig, SyncEngine, SyncError,
    SyncProgress, SyncResult,
};
use keyloft_types::{Bundle, BundleKind, Entry, Index, SyncUnit};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

pub const PASSWORD: &str = "correct horse battery staple";

/// In-memory remote store. Stamps are a monotonic counter, compared
/// opaquely like any provider stamp.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, (RemoteObject, Envelope)>>,
    next_id: AtomicU64,
    next_stamp: AtomicU64,
    pub list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    fail_list: Mutex<bool>,
    fail_downloads: Mutex<HashSet<String>>,
    fail_uploads: Mutex<HashSet<String>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next (and only the next) `list` call wait on the notify.
    pub fn gate_next_list(&self, gate: Arc<Notify>) {
        *self.list_gate.lock().unwrap() = Some(gate);
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn fail_download(&self, name: &str) {
        self.fail_downloads.lock().unwrap().insert(name.to_string());
    }

    pub fn clear_download_failures(&self) {
        self.fail_downloads.lock().unwrap().clear();
    }

    pub fn fail_upload(&self, name: &str) {
        self.fail_uploads.lock().unwrap().insert(name.to_string());
    }

    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn envelope(&self, name: &str) -> Option<Envelope> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .map(|(_, env)| env.clone())
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(name)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Stores an envelope directly, as another replica would have.
    pub fn seed(&self, name: &str, envelope: Envelope) {
        let mut objects = self.objects.lock().unwrap();
        let stamp = self.next_stamp.fetch_add(1, Ordering::SeqCst);
        let id = match objects.get(name) {
            Some((obj, _)) => obj.id.clone(),
            None => format!("id-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        let object = RemoteObject {
            id,
            name: name.to_string(),
            modified_time: format!("stamp-{stamp}"),
        };
        objects.insert(name.to_string(), (object, envelope));
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> SyncResult<Vec<RemoteObject>> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_list.lock().unwrap() {
            return Err(SyncError::Remote("injected listing failure".to_string()));
        }
        let mut listing: Vec<RemoteObject> = self
            .objects
            .lock()
            .unwrap()
            .values()
            .map(|(obj, _)| obj.clone())
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn download(&self, id: &str) -> SyncResult<Envelope> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let Some((obj, envelope)) = objects.values().find(|(obj, _)| obj.id == id) else {
            return Err(SyncError::Remote(format!("object not found: {id}")));
        };
        if self.fail_downloads.lock().unwrap().contains(&obj.name) {
            return Err(SyncError::Remote(format!(
                "injected download failure: {}",
                obj.name
            )));
        }
        Ok(envelope.clone())
    }

    async fn upload(
        &self,
        name: &str,
        envelope: &Envelope,
        _existing_id: Option<&str>,
    ) -> SyncResult<String> {
        if self.fail_uploads.lock().unwrap().contains(name) {
            return Err(SyncError::Remote(format!(
                "injected upload failure: {name}"
            )));
        }
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.seed(name, envelope.clone());
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(name)
            .map(|(obj, _)| obj.id.clone())
            .unwrap_or_default())
    }
}

/// Engine plus its collaborators, kept alive for the test's duration.
pub struct TestRig {
    pub engine: SyncEngine,
    pub remote: Arc<MemoryRemote>,
    pub passwords: Arc<MemoryPasswordCache>,
    pub tree: LocalTree,
    _dir: TempDir,
}

pub fn fast_config() -> SyncConfig {
    SyncConfig {
        debounce_delay: std::time::Duration::from_millis(50),
        poll_interval: std::time::Duration::from_millis(100),
        tombstone_retention: Duration::days(30),
        kdf: KdfParams::insecure_fast(),
    }
}

pub fn rig_with_password(password: Option<&str>) -> TestRig {
    let dir = TempDir::new().expect("temp dir");
    let remote = MemoryRemote::new();
    let passwords = Arc::new(match password {
        Some(pw) => MemoryPasswordCache::with_password(pw),
        None => MemoryPasswordCache::new(),
    });
    let engine = SyncEngine::new(
        remote.clone(),
        passwords.clone(),
        dir.path(),
        fast_config(),
    );
    let tree = engine.local().clone();
    TestRig {
        engine,
        remote,
        passwords,
        tree,
        _dir: dir,
    }
}

pub fn rig() -> TestRig {
    rig_with_password(Some(PASSWORD))
}

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|_| panic!("bad test timestamp {s}"))
}

pub fn entry(id: &str, saved: &str) -> Entry {
    Entry {
        id: id.to_string(),
        label: format!("entry {id}"),
        filename: format!("{id}.json"),
        saved_at: ts(saved),
        updated_at: None,
        deleted_at: None,
    }
}

/// Builds a favorites bundle the way another replica's codec would.
pub fn favorite_bundle(kind: &str, entries: Vec<Entry>) -> Bundle {
    let index = Index {
        key: kind.to_string(),
        entries,
    };
    let mut files = BTreeMap::new();
    for e in index.entries.iter().filter(|e| !e.is_tombstone()) {
        files.insert(e.filename.clone(), format!("{{\"macro\":\"{}\"}}", e.id));
    }
    files.insert(
        Bundle::INDEX_FILE.to_string(),
        serde_json::to_string(&index).expect("index json"),
    );
    Bundle {
        kind: BundleKind::Favorite,
        key: kind.to_string(),
        index: Some(index),
        files,
    }
}

pub fn settings_bundle(uid: &str, doc: &serde_json::Value) -> Bundle {
    let mut files = BTreeMap::new();
    files.insert(Bundle::SETTINGS_FILE.to_string(), doc.to_string());
    Bundle {
        kind: BundleKind::Settings,
        key: uid.to_string(),
        index: None,
        files,
    }
}

/// Seals a bundle for a unit under `password`, as another replica would.
pub fn seal_bundle(bundle: &Bundle, unit: &SyncUnit, password: &str) -> Envelope {
    seal_with_params(
        &serde_json::to_vec(bundle).expect("bundle json"),
        password,
        &unit.to_string(),
        &KdfParams::insecure_fast(),
    )
    .expect("seal")
}

/// Seeds the remote with a unit's bundle under its encoded object name.
pub fn seed_remote_unit(
    remote: &MemoryRemote,
    unit: &SyncUnit,
    bundle: &Bundle,
    password: &str,
) {
    remote.seed(&object_name(unit), seal_bundle(bundle, unit, password));
}

/// Drains every progress event currently buffered on a receiver.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<SyncProgress>,
) -> Vec<SyncProgress> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
