//! The encrypted transport wrapper placed in the remote store.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, SALT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Size of the AEAD nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// The versioned wrapper around one sync unit's ciphertext.
///
/// `sync_unit` is stored in plaintext so password rotation can re-encrypt an
/// object without re-deriving its unit from the remote object name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u8,
    pub sync_unit: String,
    pub updated_at: DateTime<Utc>,
    /// Base64 Argon2id salt, fresh per envelope.
    pub salt: String,
    /// Base64 AEAD nonce, fresh per envelope.
    pub nonce: String,
    /// Base64 ChaCha20-Poly1305 ciphertext, auth tag included.
    pub ciphertext: String,
}

/// Encrypts `plaintext` under `password` with the default KDF parameters,
/// tagging the envelope with the originating sync unit.
pub fn seal_envelope(plaintext: &[u8], password: &str, sync_unit: &str) -> CryptoResult<Envelope> {
    seal_with_params(plaintext, password, sync_unit, &KdfParams::default())
}

/// Encrypts `plaintext` under `password` with explicit KDF parameters.
pub fn seal_with_params(
    plaintext: &[u8],
    password: &str,
    sync_unit: &str,
    params: &KdfParams,
) -> CryptoResult<Envelope> {
    let salt = Salt::random();
    let key = derive_key(password, &salt, params)?;
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(Envelope {
        version: ENVELOPE_VERSION,
        sync_unit: sync_unit.to_string(),
        updated_at: Utc::now(),
        salt: STANDARD.encode(salt.as_bytes()),
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(&ciphertext),
    })
}

/// Decrypts an envelope with `password` and the default KDF parameters.
///
/// Fails with [`CryptoError::Decryption`] on a wrong password or tampered
/// ciphertext. The caller decides what that means: for the canary it is a
/// bad credential, for anything else a corrupt object.
pub fn open_envelope(envelope: &Envelope, password: &str) -> CryptoResult<Vec<u8>> {
    open_with_params(envelope, password, &KdfParams::default())
}

/// Decrypts an envelope with explicit KDF parameters.
pub fn open_with_params(
    envelope: &Envelope,
    password: &str,
    params: &KdfParams,
) -> CryptoResult<Vec<u8>> {
    let salt_bytes = decode_field(&envelope.salt, "salt")?;
    let salt: [u8; SALT_SIZE] = salt_bytes
        .as_slice()
        .try_into()
        .map_err(|_| malformed("salt", salt_bytes.len()))?;

    let nonce_bytes = decode_field(&envelope.nonce, "nonce")?;
    let nonce: [u8; NONCE_SIZE] = nonce_bytes
        .as_slice()
        .try_into()
        .map_err(|_| malformed("nonce", nonce_bytes.len()))?;

    let ciphertext = decode_field(&envelope.ciphertext, "ciphertext")?;

    let key = derive_key(password, &Salt::from_bytes(salt), params)?;
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("wrong password or tampered data".to_string()))
}

fn decode_field(value: &str, field: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64 {field}: {e}")))
}

fn malformed(field: &str, len: usize) -> CryptoError {
    CryptoError::MalformedEnvelope(format!("unexpected {field} length: {len}"))
}
