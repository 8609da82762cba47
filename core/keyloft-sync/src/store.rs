//! Remote object store abstraction.
//!
//! The engine asks very little of a remote store: a flat namespace of named
//! objects with opaque modification stamps, plus get and put of envelopes.
//! No locking, no transactions, no conditional writes: tolerating lost
//! updates is the merge engine's job, not the transport's.

use crate::error::SyncResult;
use async_trait::async_trait;
use keyloft_crypto::Envelope;
use keyloft_types::SyncUnit;
use serde::{Deserialize, Serialize};

/// Fixed remote name of the password canary. Never decodes to a sync unit.
pub const CANARY_NAME: &str = "password-check";

/// Metadata for one object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Provider-assigned identifier, stable across renames.
    pub id: String,
    /// Flat object name (see [`object_name`]).
    pub name: String,
    /// Provider-reported modification stamp. Compared opaquely; two equal
    /// stamps mean "unchanged", nothing more.
    pub modified_time: String,
}

/// A remote object store holding encrypted envelopes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the storage provider.
    fn provider_name(&self) -> &'static str;

    /// Lists every object in the sync namespace.
    async fn list(&self) -> SyncResult<Vec<RemoteObject>>;

    /// Downloads one envelope by object id.
    async fn download(&self, id: &str) -> SyncResult<Envelope>;

    /// Uploads an envelope under `name`, overwriting `existing_id` when
    /// given. Returns the object's id.
    async fn upload(
        &self,
        name: &str,
        envelope: &Envelope,
        existing_id: Option<&str>,
    ) -> SyncResult<String>;
}

/// Encodes a sync unit as a flat remote object name.
///
/// Percent-encoding keeps the mapping deterministic and reversible while
/// flattening the path separators remote stores tend to reject.
pub fn object_name(unit: &SyncUnit) -> String {
    urlencoding::encode(&unit.to_string()).into_owned()
}

/// Decodes a remote object name back to its sync unit.
///
/// Returns `None` for the canary and for names this version cannot parse, so
/// unknown objects are skipped rather than failing the pass.
pub fn decode_object_name(name: &str) -> Option<SyncUnit> {
    if name == CANARY_NAME {
        return None;
    }
    let decoded = urlencoding::decode(name).ok()?;
    decoded.parse().ok()
}
