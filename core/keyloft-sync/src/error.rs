//! Error types for the sync core.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The canary failed to decrypt: the supplied password is wrong.
    /// Surfaced distinctly from network errors so the UI prompts for
    /// credentials instead of retrying.
    #[error("sync password does not match the remote data")]
    PasswordMismatch,

    /// Remote store failure (listing, download, or upload).
    #[error("remote store error: {0}")]
    Remote(String),

    /// A sync pass or password change is already running.
    #[error("a sync is already in progress")]
    SyncInProgress,

    /// `change_password` was called with the current password.
    #[error("new password matches the current password")]
    PasswordUnchanged,

    /// An entry filename that would resolve outside its unit directory.
    #[error("invalid entry filename: {0}")]
    InvalidFilename(String),

    /// A downloaded bundle is missing required parts.
    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    /// Envelope crypto failure.
    #[error(transparent)]
    Crypto(#[from] keyloft_crypto::CryptoError),

    /// Local state tree I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
