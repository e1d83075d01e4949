//! Error types for the artifact integrity core.

use thiserror::Error;

/// Errors that can occur while fingerprinting an artifact.
///
/// I/O failures are kept apart from everything else so that a caller can
/// tell an unreadable source from an input that cannot be hashed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The byte source could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Chunk size must be non-zero.
    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// A structured state entry could not be hashed.
    #[error("unsupported entry {key:?}: {reason}")]
    UnsupportedEntry { key: String, reason: String },

    /// A structured state reported the same key twice.
    #[error("duplicate key in structured state: {0:?}")]
    DuplicateKey(String),

    /// A digest string was not 32 bytes of hex.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// A deserialised Merkle tree is not internally consistent.
    #[error("invalid merkle tree: {0}")]
    InvalidTree(String),

    /// Unknown hash algorithm or dtype name.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
}

impl CoreError {
    /// Build an `UnsupportedEntry` error for the given key.
    pub fn unsupported(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::UnsupportedEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from reading the source.
    pub fn is_io(&self) -> bool {
        matches!(self, CoreError::Io(_))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
