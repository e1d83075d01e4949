//! # Artifact Integrity
//!
//! The unified API for fingerprinting uploaded model artifacts and recording
//! them with an external registrar.
//!
//! ## Overview
//!
//! - **Fingerprints**: a flat digest of the bytes, a chunked Merkle root, and
//!   (for checkpoints) a canonical hash of the decoded tensor state
//! - **Registration**: hardened calls to the external register and rent tools
//! - **Async**: every blocking call has an `_async` twin on tokio's blocking pool
//!
//! ## Key Concepts
//!
//! - **Content hash**: the registered identity. Canonical when a structured
//!   state was supplied and hashable, otherwise the stream digest.
//! - **Merkle root**: always over the raw bytes; changes with the chunk size.
//! - **Empty artifact**: every digest of zero bytes is `H("")`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use artifact_integrity::{IntegrityKernel, StateDict, Tensor};
//! use std::path::Path;
//!
//! fn example() -> artifact_integrity::Result<()> {
//!     let kernel = IntegrityKernel::from_env()?;
//!
//!     let state = StateDict::new().with("fc.weight", Tensor::from_f32(vec![2], &[0.5, -0.5]));
//!     let publication = kernel.publish(Path::new("uploads/model.pt"), Some(&state), 1000, None)?;
//!
//!     println!("{} {}", publication.fingerprint.content_hash, publication.fingerprint.merkle_root);
//!     if let Some(receipt) = publication.registration.receipt() {
//!         println!("registered in {}", receipt.txid);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `artifact_integrity::core` - Digests, Merkle trees, structured state
//! - `artifact_integrity::registrar` - Process invocation and registrar client

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod kernel;

// Re-export component crates
pub use artifact_integrity_core as core;
pub use artifact_integrity_registrar as registrar;

// Re-export main types for convenience
pub use config::IntegrityConfig;
pub use error::{IntegrityError, Result};
pub use fingerprint::{
    storage_locator_for, ArtifactFingerprint, ArtifactKind, FingerprintMethod, Fingerprinter,
};
pub use kernel::{IntegrityKernel, Publication, RegistrationStatus};

// Re-export commonly used component types
pub use artifact_integrity_core::{
    CanonicalStructureHasher, DType, Digest, HashAlgorithm, MerkleBuilder, MerkleProof, MerkleTree,
    StateDict, StreamingDigest, StructuredState, Tensor,
};
pub use artifact_integrity_registrar::{
    ExternalOutcome, Failure, FailureKind, RegistrarClient, RegistrarConfig, RegistrationReceipt,
    RegistrationRequest, RentalReceipt, RentalRequest,
};
