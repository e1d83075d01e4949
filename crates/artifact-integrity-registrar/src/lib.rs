//! # Artifact Integrity Registrar
//!
//! Hardened invocation of external registrar tooling.
//!
//! ## Overview
//!
//! The registrar is an out-of-process command that prints a JSON result,
//! usually surrounded by log noise. This crate:
//!
//! - runs a command under a hard deadline and always reaps it ([`ProcessInvoker`])
//! - recovers the structured result from noisy stdout ([`extract_result`])
//! - separates transport failures from the tool rejecting a request
//!   ([`ExternalOutcome`], [`FailureKind`])
//! - wraps the register and rent commands in a typed client ([`RegistrarClient`])
//!
//! Nothing here retries. Retry policy belongs to the caller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use artifact_integrity_core::{Digest, HashAlgorithm};
//! use artifact_integrity_registrar::{RegistrarClient, RegistrarConfig, RegistrationRequest};
//!
//! fn example() -> artifact_integrity_registrar::Result<()> {
//!     let client = RegistrarClient::new(RegistrarConfig::from_env()?);
//!     let request = RegistrationRequest::new(Digest::hash(HashAlgorithm::Sha256, b"weights"), "file:///models/a.pt", 1000);
//!     let receipt = client.register(&request)?;
//!     println!("{} {}", receipt.txid, receipt.model_address);
//!     Ok(())
//! }
//! ```
//!
//! ## Outcome Classification
//!
//! ```text
//! spawn error            -> Failure(Spawn)
//! deadline exceeded      -> Failure(Timeout)    child killed, partial output kept
//! non-zero exit          -> Failure(Exit)       payload kept when parseable
//! no JSON in stdout      -> Failure(Extraction)
//! success != true        -> Failure(Logical)
//! otherwise              -> Success
//! ```

pub mod error;
pub mod extract;
pub mod outcome;
pub mod process;
pub mod registrar;

pub use error::{RegistrarError, Result};
pub use extract::{extract_result, Extracted, ExtractionError, ExtractionStrategy};
pub use outcome::{ExternalOutcome, Failure, FailureKind, Success, DEFAULT_SUMMARY_CHARS};
pub use process::{Captured, InvokerConfig, ProcessInvoker, DEFAULT_TIMEOUT_SECS};
pub use registrar::{
    RegistrarClient, RegistrarConfig, RegistrationReceipt, RegistrationRequest, RentalReceipt,
    RentalRequest,
};
