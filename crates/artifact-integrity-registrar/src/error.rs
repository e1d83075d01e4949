//! Error types for registrar calls.

use thiserror::Error;

use crate::outcome::{Failure, DEFAULT_SUMMARY_CHARS};

/// Errors returned by [`RegistrarClient`](crate::RegistrarClient).
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// The external tool failed. Carries the captured output.
    #[error("registrar call failed: {0}")]
    Outcome(Failure),

    /// Invalid configuration value.
    #[error("invalid registrar configuration: {0}")]
    Config(String),

    /// The tool reported success but the payload lacked a required field.
    #[error("malformed registrar payload: {0}")]
    Decode(String),
}

impl RegistrarError {
    /// The underlying failure, when the tool itself failed.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            RegistrarError::Outcome(f) => Some(f),
            _ => None,
        }
    }

    /// Bounded audit string suitable for persisting as a last-error field.
    pub fn audit_summary(&self) -> String {
        match self {
            RegistrarError::Outcome(f) => f.summary(DEFAULT_SUMMARY_CHARS),
            other => other.to_string().chars().take(DEFAULT_SUMMARY_CHARS).collect(),
        }
    }
}

impl From<Failure> for RegistrarError {
    fn from(failure: Failure) -> Self {
        RegistrarError::Outcome(failure)
    }
}

/// Result type for registrar operations.
pub type Result<T> = std::result::Result<T, RegistrarError>;
