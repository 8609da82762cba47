//! The encryption gate: canary validation and password rotation.
//!
//! A wrong password must be caught before any real data is merged, and a
//! password change must never leave the remote store half-migrated; with
//! objects split across two passwords the data is unrecoverable without
//! both. Hence the canary check up front and the strict
//! decrypt-everything-first rotation below.

use crate::engine::{PassGuard, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::store::{RemoteObject, CANARY_NAME};
use keyloft_crypto::{open_with_params, seal_with_params, CryptoError, Envelope};
use std::sync::atomic::Ordering;
use tracing::{debug, info};

/// Plaintext of the canary envelope.
fn canary_marker() -> Vec<u8> {
    serde_json::json!({ "type": CANARY_NAME, "version": 1 })
        .to_string()
        .into_bytes()
}

impl SyncEngine {
    /// Confirms `password` against the remote canary, creating the canary
    /// if this is the first sync against an empty remote.
    ///
    /// A canary that fails to decrypt is a [`SyncError::PasswordMismatch`],
    /// never conflated with a network failure, so the UI can prompt for
    /// credentials instead of retrying. Success is cached for the engine's
    /// lifetime; scoped passes skip revalidation.
    pub(crate) async fn validate_canary(
        &self,
        password: &str,
        listing: &[RemoteObject],
    ) -> SyncResult<()> {
        match listing.iter().find(|o| o.name == CANARY_NAME) {
            Some(obj) => {
                let envelope = self.shared.remote.download(&obj.id).await?;
                self.open_canary(&envelope, password)?;
                debug!("password canary validated");
            }
            None => {
                // First sync against this remote: nothing to check yet, so
                // plant the canary for every replica that follows.
                let sealed = seal_with_params(
                    &canary_marker(),
                    password,
                    CANARY_NAME,
                    &self.shared.config.kdf,
                )?;
                self.shared.remote.upload(CANARY_NAME, &sealed, None).await?;
                info!("created password canary");
            }
        }
        self.shared.canary_validated.store(true, Ordering::Release);
        Ok(())
    }

    fn open_canary(&self, envelope: &Envelope, password: &str) -> SyncResult<Vec<u8>> {
        open_with_params(envelope, password, &self.shared.config.kdf).map_err(|e| match e {
            CryptoError::Decryption(_) => SyncError::PasswordMismatch,
            other => other.into(),
        })
    }

    /// Rotates the sync password across every remote object.
    ///
    /// Refuses while a sync pass runs and when the password is unchanged.
    /// Three phases, writes strictly after all reads: (1) download and
    /// decrypt every non-canary object under the old password, aborting on
    /// the first failure with nothing written; (2) re-encrypt and overwrite
    /// each object in place, preserving the `sync_unit` tag from its
    /// envelope; (3) recreate the canary. Only then is the new password
    /// committed to the cache.
    pub async fn change_password(&self, old: &str, new: &str) -> SyncResult<()> {
        if new == old {
            return Err(SyncError::PasswordUnchanged);
        }
        let Some(_guard) = PassGuard::try_acquire(&self.shared) else {
            return Err(SyncError::SyncInProgress);
        };
        self.rotate_password(old, new).await
    }

    async fn rotate_password(&self, old: &str, new: &str) -> SyncResult<()> {
        let kdf = &self.shared.config.kdf;
        let listing = self.shared.remote.list().await?;

        // Fail fast on a wrong old password before touching real data.
        let canary = listing.iter().find(|o| o.name == CANARY_NAME);
        if let Some(obj) = canary {
            let envelope = self.shared.remote.download(&obj.id).await?;
            self.open_canary(&envelope, old)?;
        }

        // Phase 1: everything must decrypt before anything is rewritten.
        let mut decrypted: Vec<(&RemoteObject, String, Vec<u8>)> = Vec::new();
        for obj in listing.iter().filter(|o| o.name != CANARY_NAME) {
            let envelope = self.shared.remote.download(&obj.id).await?;
            let plaintext = open_with_params(&envelope, old, kdf).map_err(|e| match e {
                CryptoError::Decryption(_) => SyncError::PasswordMismatch,
                other => other.into(),
            })?;
            decrypted.push((obj, envelope.sync_unit, plaintext));
        }

        // Phase 2: re-encrypt in place under the new password.
        for (obj, sync_unit, plaintext) in &decrypted {
            let resealed = seal_with_params(plaintext, new, sync_unit, kdf)?;
            self.shared
                .remote
                .upload(&obj.name, &resealed, Some(&obj.id))
                .await?;
            debug!(unit = %sync_unit, "re-encrypted");
        }

        // Phase 3: new canary, then commit.
        let sealed = seal_with_params(&canary_marker(), new, CANARY_NAME, kdf)?;
        self.shared
            .remote
            .upload(CANARY_NAME, &sealed, canary.map(|o| o.id.as_str()))
            .await?;

        self.shared.passwords.store(new);
        self.shared.canary_validated.store(false, Ordering::Release);
        info!("sync password rotated across {} objects", decrypted.len());
        Ok(())
    }
}
