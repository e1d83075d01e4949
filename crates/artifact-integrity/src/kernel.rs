//! The IntegrityKernel: unified API for artifact integrity.
//!
//! The kernel ties fingerprinting and registrar calls into the upload flow:
//! classify the file, fingerprint it, then record the fingerprint with the
//! external registrar. Every blocking operation has an `_async` twin that
//! runs on tokio's blocking pool.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artifact_integrity_core::{StateDict, StructuredState};
use artifact_integrity_registrar::{
    Failure, RegistrarClient, RegistrationReceipt, RegistrationRequest, RentalReceipt,
    RentalRequest,
};
use serde::Serialize;

use crate::config::IntegrityConfig;
use crate::error::{IntegrityError, Result};
use crate::fingerprint::{storage_locator_for, ArtifactFingerprint, ArtifactKind, Fingerprinter};

/// Registration state of a published artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered(RegistrationReceipt),
    Failed {
        /// Bounded audit string.
        error: String,
        #[serde(skip)]
        failure: Option<Failure>,
    },
}

impl RegistrationStatus {
    /// Whether the registrar accepted the fingerprint.
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationStatus::Registered(_))
    }

    /// The receipt, when registration succeeded.
    pub fn receipt(&self) -> Option<&RegistrationReceipt> {
        match self {
            RegistrationStatus::Registered(r) => Some(r),
            RegistrationStatus::Failed { .. } => None,
        }
    }
}

/// Result of [`IntegrityKernel::publish`].
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub kind: ArtifactKind,
    pub fingerprint: ArtifactFingerprint,
    pub storage_locator: String,
    pub registration: RegistrationStatus,
}

/// The main kernel struct. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IntegrityKernel {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: IntegrityConfig,
    fingerprinter: Fingerprinter,
    registrar: RegistrarClient,
}

impl IntegrityKernel {
    /// Create a new kernel instance.
    pub fn new(config: IntegrityConfig) -> Self {
        let fingerprinter = Fingerprinter::new(config.algorithm, config.chunk_size);
        let registrar = RegistrarClient::new(config.registrar.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                fingerprinter,
                registrar,
            }),
        }
    }

    /// Kernel configured from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(IntegrityConfig::from_env()?))
    }

    /// Get the kernel configuration.
    pub fn config(&self) -> &IntegrityConfig {
        &self.inner.config
    }

    /// Get the fingerprinter.
    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.inner.fingerprinter
    }

    /// Get the registrar client.
    pub fn registrar(&self) -> &RegistrarClient {
        &self.inner.registrar
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fingerprinting
    // ─────────────────────────────────────────────────────────────────────────

    /// Fingerprint an in-memory or streamed source of unknown kind.
    pub fn fingerprint_reader<R: Read>(
        &self,
        source: R,
        state: Option<&dyn StructuredState>,
    ) -> Result<ArtifactFingerprint> {
        self.inner.fingerprinter.fingerprint(source, state)
    }

    /// Fingerprint a file on disk.
    ///
    /// `state` is only consulted for checkpoint files; for other kinds it is
    /// ignored and the raw bytes are the identity.
    pub fn fingerprint_file(
        &self,
        path: &Path,
        state: Option<&dyn StructuredState>,
    ) -> Result<ArtifactFingerprint> {
        let kind = ArtifactKind::from_path(path)?;
        self.fingerprint_kind(path, kind, state)
    }

    fn fingerprint_kind(
        &self,
        path: &Path,
        kind: ArtifactKind,
        state: Option<&dyn StructuredState>,
    ) -> Result<ArtifactFingerprint> {
        let state = match state {
            Some(_) if !kind.supports_structured_state() => {
                tracing::debug!(
                    ?kind,
                    path = %path.display(),
                    "ignoring structured state for raw artifact"
                );
                None
            }
            other => other,
        };
        let file = File::open(path).map_err(|e| IntegrityError::io(path, e))?;
        self.inner.fingerprinter.fingerprint(file, state)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registrar
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a fingerprint with the registrar.
    pub fn register(&self, request: &RegistrationRequest) -> Result<RegistrationReceipt> {
        Ok(self.inner.registrar.register(request)?)
    }

    /// Rent a registered model.
    pub fn rent(&self, request: &RentalRequest) -> Result<RentalReceipt> {
        Ok(self.inner.registrar.rent(request)?)
    }

    /// Fingerprint a stored artifact and register it.
    ///
    /// Fingerprinting errors are returned as `Err`. A registrar failure is
    /// not: the fingerprint is still valid, so it is reported in
    /// [`Publication::registration`] for the caller to persist.
    pub fn publish(
        &self,
        path: &Path,
        state: Option<&dyn StructuredState>,
        price: u64,
        signing_key_path: Option<&Path>,
    ) -> Result<Publication> {
        let kind = ArtifactKind::from_path(path)?;
        let fingerprint = self.fingerprint_kind(path, kind, state)?;
        let storage_locator = storage_locator_for(path);

        let mut request =
            RegistrationRequest::new(fingerprint.content_hash, storage_locator.clone(), price);
        if let Some(key) = signing_key_path {
            request = request.signing_key(key);
        }

        let registration = match self.inner.registrar.register(&request) {
            Ok(receipt) => RegistrationStatus::Registered(receipt),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "registration failed");
                RegistrationStatus::Failed {
                    error: e.audit_summary(),
                    failure: e.failure().cloned(),
                }
            }
        };

        Ok(Publication {
            kind,
            fingerprint,
            storage_locator,
            registration,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Async
    // ─────────────────────────────────────────────────────────────────────────

    /// Async version of [`IntegrityKernel::fingerprint_file`].
    pub async fn fingerprint_file_async(
        &self,
        path: PathBuf,
        state: Option<StateDict>,
    ) -> Result<ArtifactFingerprint> {
        let kernel = self.clone();
        tokio::task::spawn_blocking(move || {
            kernel.fingerprint_file(&path, state.as_ref().map(|s| s as &dyn StructuredState))
        })
        .await?
    }

    /// Async version of [`IntegrityKernel::register`].
    pub async fn register_async(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationReceipt> {
        let kernel = self.clone();
        tokio::task::spawn_blocking(move || kernel.register(&request)).await?
    }

    /// Async version of [`IntegrityKernel::rent`].
    pub async fn rent_async(&self, request: RentalRequest) -> Result<RentalReceipt> {
        let kernel = self.clone();
        tokio::task::spawn_blocking(move || kernel.rent(&request)).await?
    }

    /// Async version of [`IntegrityKernel::publish`].
    pub async fn publish_async(
        &self,
        path: PathBuf,
        state: Option<StateDict>,
        price: u64,
        signing_key_path: Option<PathBuf>,
    ) -> Result<Publication> {
        let kernel = self.clone();
        tokio::task::spawn_blocking(move || {
            kernel.publish(
                &path,
                state.as_ref().map(|s| s as &dyn StructuredState),
                price,
                signing_key_path.as_deref(),
            )
        })
        .await?
    }
}

impl Default for IntegrityKernel {
    fn default() -> Self {
        Self::new(IntegrityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_integrity_core::{HashAlgorithm, Tensor};
    use artifact_integrity_registrar::RegistrarConfig;
    use std::time::Duration;

    fn missing_registrar() -> IntegrityConfig {
        IntegrityConfig::default().registrar(
            RegistrarConfig::default()
                .interpreter(None)
                .register_script("/nonexistent/register_model")
                .timeout(Duration::from_secs(5)),
        )
    }

    #[test]
    fn test_fingerprint_file_rejects_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hi").unwrap();
        let err = IntegrityKernel::default().fingerprint_file(&path, None).unwrap_err();
        assert!(matches!(err, IntegrityError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_fingerprint_missing_file() {
        let err = IntegrityKernel::default()
            .fingerprint_file(Path::new("/nonexistent/model.onnx"), None)
            .unwrap_err();
        assert!(matches!(err, IntegrityError::Io { .. }));
    }

    #[test]
    fn test_state_ignored_for_raw_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"onnx graph").unwrap();
        let state = StateDict::new().with("w", Tensor::from_f32(vec![1], &[1.0]));

        let fp = IntegrityKernel::default().fingerprint_file(&path, Some(&state)).unwrap();
        assert_eq!(fp.method, crate::FingerprintMethod::Stream);
        assert_eq!(fp.content_hash, fp.stream_digest);
    }

    #[test]
    fn test_publish_records_registrar_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"weights").unwrap();

        let kernel = IntegrityKernel::new(missing_registrar());
        let publication = kernel.publish(&path, None, 10, None).unwrap();
        assert!(!publication.registration.is_registered());
        assert_eq!(publication.storage_locator, storage_locator_for(&path));
        assert_eq!(publication.fingerprint.algorithm, HashAlgorithm::Sha256);
        match publication.registration {
            RegistrationStatus::Failed { error, failure } => {
                assert!(error.contains("failed to start"));
                assert!(failure.unwrap().is_transport());
            }
            RegistrationStatus::Registered(_) => panic!("registered without a registrar"),
        }
    }

    #[tokio::test]
    async fn test_async_matches_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");
        std::fs::write(&path, vec![7u8; 5000]).unwrap();
        let state = StateDict::new().with("b", Tensor::from_i64(vec![], &[7]));

        let kernel = IntegrityKernel::new(IntegrityConfig::default().chunk_size(1024));
        let blocking = kernel.fingerprint_file(&path, Some(&state)).unwrap();
        let from_async = kernel
            .fingerprint_file_async(path.clone(), Some(state))
            .await
            .unwrap();
        assert_eq!(blocking, from_async);
        assert_eq!(from_async.leaf_count, 5);
        assert_eq!(from_async.method, crate::FingerprintMethod::Canonical);
    }
}
