//! Secure password cache abstraction.
//!
//! The sync engine retrieves the sync password from an opaque cache rather
//! than holding it itself. The desktop shell backs the trait with the OS
//! keychain; tests and headless runs use the in-memory implementation. Sync
//! is opportunistic: an empty cache means "do not sync", never an error.

use std::sync::{Mutex, PoisonError};

/// Stores and retrieves the sync password.
///
/// Implementations own the secret. Callers must not copy it anywhere that
/// outlives the call.
pub trait PasswordCache: Send + Sync {
    /// Persists the password.
    fn store(&self, password: &str);

    /// Returns the cached password, if any.
    fn retrieve(&self) -> Option<String>;

    /// Forgets the password.
    fn clear(&self);
}

/// Process-local cache holding the password in memory only.
#[derive(Default)]
pub struct MemoryPasswordCache {
    slot: Mutex<Option<String>>,
}

impl MemoryPasswordCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache pre-loaded with `password`.
    pub fn with_password(password: &str) -> Self {
        let cache = Self::new();
        cache.store(password);
        cache
    }
}

impl PasswordCache for MemoryPasswordCache {
    fn store(&self, password: &str) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(password.to_string());
    }

    fn retrieve(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
