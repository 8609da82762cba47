//! Encrypted multi-replica sync engine for Keyloft.
//!
//! Keeps the local state tree (per-keyboard settings, favorites, layout
//! snapshots) consistent with a remote object store that offers nothing but
//! list/get/put of opaque blobs. There is no server-side authority: two
//! replicas editing independently converge through tombstoned, per-entry
//! last-writer-wins merging, and everything that leaves the machine is
//! encrypted under the user's sync password.
//!
//! # Components
//!
//! - **Bundle codec** ([`bundle`]): packs one sync unit (index + data files,
//!   or a settings document) into a plaintext payload and back.
//! - **Merge engine** ([`merge`]): set-union of entry lists with per-id LWW
//!   and tombstone garbage collection.
//! - **Encryption gate** ([`SyncEngine::change_password`] and the canary
//!   validation inside every pass): proves a password against a fixed-content
//!   canary object before trusting it on real data.
//! - **Orchestrator** ([`SyncEngine::execute_sync`]): one listing per pass,
//!   per-unit failure isolation, structured progress events.
//! - **Change debouncer** ([`SyncEngine::notify_change`]): coalesces local
//!   edits into one upload after a quiet period.
//! - **Remote poller** ([`SyncEngine::start_polling`]): detects foreign
//!   changes by diffing modification stamps, downloading only what moved.
//!
//! # Sync process
//!
//! 1. List the remote store once.
//! 2. Validate the password canary (bootstrap it on first sync).
//! 3. Per unit: download, decrypt, merge, and upload when the merge says the
//!    remote side is stale.
//! 4. Refresh the poller baseline so our own writes are not re-downloaded.
//!
//! At most one pass runs at a time; overlapping triggers either no-op
//! (manual call, poll tick) or reschedule themselves (debounced flush).

pub mod bundle;
mod debounce;
mod engine;
mod error;
mod folder;
mod gate;
mod local;
pub mod merge;
mod poller;
mod store;

pub use engine::{
    SyncConfig, SyncDirection, SyncEngine, SyncProgress, SyncScope, SyncStatus,
};
pub use error::{SyncError, SyncResult};
pub use folder::FolderStore;
pub use local::LocalTree;
pub use store::{decode_object_name, object_name, RemoteObject, RemoteStore, CANARY_NAME};
