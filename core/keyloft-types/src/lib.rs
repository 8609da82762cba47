//! Core type definitions for Keyloft.
//!
//! This crate defines the fundamental, UI-agnostic types shared by the sync
//! engine and the desktop shell:
//! - Sync unit identifiers (one per independently-synchronized collection)
//! - Index entries with tombstone markers
//! - Transport bundles (the plaintext payload packed into envelopes)
//! - Lenient timestamp handling for replica metadata
//!
//! Device-protocol types (keymaps, matrix geometry, firmware quirks) belong
//! to the configurator layer, not here.

mod bundle;
mod entry;
pub mod timestamp;
mod unit;

pub use bundle::{Bundle, BundleKind};
pub use entry::{Entry, Index};
pub use unit::SyncUnit;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid sync unit: {0}")]
    InvalidUnit(String),
}
