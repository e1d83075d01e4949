//! Error types for the integrity kernel.

use std::path::PathBuf;

use artifact_integrity_core::CoreError;
use artifact_integrity_registrar::RegistrarError;
use thiserror::Error;

/// Errors that can occur during kernel operations.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Hashing or structure error.
    #[error("fingerprint error: {0}")]
    Core(#[from] CoreError),

    /// Registrar call failed.
    #[error("registrar error: {0}")]
    Registrar(#[from] RegistrarError),

    /// Artifact could not be opened or read.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension is not an accepted artifact type.
    #[error("unsupported artifact extension: {0:?}")]
    UnsupportedExtension(Option<String>),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntegrityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntegrityError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, IntegrityError>;
