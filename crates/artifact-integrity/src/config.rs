//! Kernel configuration.

use artifact_integrity_core::{HashAlgorithm, DEFAULT_CHUNK_SIZE};
use artifact_integrity_registrar::RegistrarConfig;

use crate::error::{IntegrityError, Result};

/// Merkle chunk size in bytes.
pub const ENV_CHUNK_SIZE: &str = "ARTIFACT_CHUNK_SIZE";
/// `sha256` or `blake3`.
pub const ENV_HASH_ALGORITHM: &str = "ARTIFACT_HASH_ALGORITHM";

/// Configuration for the [`IntegrityKernel`](crate::IntegrityKernel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityConfig {
    /// Digest used for content hashes and Merkle nodes.
    pub algorithm: HashAlgorithm,
    /// Merkle leaf size in bytes.
    pub chunk_size: usize,
    /// Registrar tooling.
    pub registrar: RegistrarConfig,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            registrar: RegistrarConfig::default(),
        }
    }
}

impl IntegrityConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, so tests can supply their own variables.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let registrar = RegistrarConfig::from_env_with(&lookup)?;
        let mut config = Self {
            registrar,
            ..Self::default()
        };

        if let Some(raw) = lookup(ENV_CHUNK_SIZE).filter(|v| !v.trim().is_empty()) {
            config.chunk_size = raw
                .trim()
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .ok_or_else(|| {
                    IntegrityError::Config(format!(
                        "{} must be a positive integer, got {:?}",
                        ENV_CHUNK_SIZE, raw
                    ))
                })?;
        }
        if let Some(raw) = lookup(ENV_HASH_ALGORITHM).filter(|v| !v.trim().is_empty()) {
            config.algorithm = raw
                .trim()
                .parse()
                .map_err(|e| IntegrityError::Config(format!("{}: {}", ENV_HASH_ALGORITHM, e)))?;
        }
        Ok(config)
    }

    /// Set the hash algorithm.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the Merkle chunk size.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the registrar configuration.
    pub fn registrar(mut self, registrar: RegistrarConfig) -> Self {
        self.registrar = registrar;
        self
    }
}
