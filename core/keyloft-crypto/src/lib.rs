//! Password-keyed envelope encryption for Keyloft sync.
//!
//! Everything uploaded to the remote store is an [`Envelope`]: a versioned
//! wrapper carrying a fresh Argon2id salt, the AEAD nonce, and the
//! ChaCha20-Poly1305 ciphertext of a serialized bundle. The remote store
//! never sees plaintext, and a password change never exposes one either:
//! rotation downloads, re-encrypts, and overwrites in place.
//!
//! The sync password itself lives behind the [`PasswordCache`] trait; the
//! desktop shell backs it with the OS keychain, tests use
//! [`MemoryPasswordCache`].

mod cache;
mod envelope;
mod error;
mod key;

pub use cache::{MemoryPasswordCache, PasswordCache};
pub use envelope::{
    open_envelope, open_with_params, seal_envelope, seal_with_params, Envelope, ENVELOPE_VERSION,
    NONCE_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
