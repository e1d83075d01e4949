//! # Artifact Integrity Testkit
//!
//! Testing utilities for artifact integrity.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known inputs with independently computed digests
//! - **Generators**: Proptest strategies for tensors, states, and noisy tool output
//! - **Fixtures**: Scratch artifacts and scripted registrar stand-ins
//!
//! ## Golden Vectors
//!
//! ```rust
//! use artifact_integrity_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, actual) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, actual);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use artifact_integrity_core::canonical_state_hash;
//! use artifact_integrity_testkit::generators::{flip_byte_order, state_dict};
//!
//! proptest! {
//!     #[test]
//!     fn byte_order_does_not_matter(state in state_dict(4)) {
//!         prop_assert_eq!(
//!             canonical_state_hash(&state).unwrap(),
//!             canonical_state_hash(&flip_byte_order(&state)).unwrap(),
//!         );
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use artifact_integrity_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new().unwrap();
//! let path = fixture.pattern_artifact("model.bin", 10 * 1024 * 1024).unwrap();
//! let publication = fixture.kernel().unwrap().publish(&path, None, 0, None).unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::TestFixture;
pub use generators::{flip_byte_order, state_dict, tensor};
pub use vectors::{all_vectors, pattern_bytes, state_vectors, verify_all_vectors, GoldenVector};
