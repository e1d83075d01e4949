//! # Artifact Integrity Core
//!
//! Pure fingerprinting primitives for uploaded artifacts: streaming digests,
//! chunked Merkle trees, and canonical hashing of structured tensor state.
//!
//! This crate does no process management and no persistence. The only I/O it
//! performs is sequential reads from a caller-supplied [`std::io::Read`].
//!
//! ## Key Types
//!
//! - [`Digest`] - 32-byte fingerprint, exchanged as lowercase hex
//! - [`StreamingDigest`] - Flat digest of a stream, independent of chunk size
//! - [`MerkleBuilder`] / [`MerkleTree`] - Chunked Merkle root and inclusion proofs
//! - [`CanonicalStructureHasher`] - Order-independent digest of a [`StructuredState`]
//!
//! ## Empty artifacts
//!
//! An empty source has exactly one fingerprint, `H("")`: the flat digest,
//! the Merkle root (zero leaves), and the canonical hash of an empty state
//! all agree on it. See [`Digest::empty`].
//!
//! ## Usage
//!
//! ```rust
//! use artifact_integrity_core::{MerkleBuilder, StreamingDigest};
//! use std::io::Cursor;
//!
//! let bytes = b"model weights".to_vec();
//! let digest = StreamingDigest::new().digest(Cursor::new(&bytes)).unwrap();
//! let tree = MerkleBuilder::new().chunk_size(4).build(Cursor::new(&bytes)).unwrap();
//! assert_eq!(tree.leaf_count(), 4);
//! println!("{} {}", digest, tree.root());
//! ```

pub mod canonical;
pub mod digest;
pub mod error;
pub mod merkle;
pub mod state;
pub mod stream;

pub use canonical::{canonical_state_hash, CanonicalStructureHasher};
pub use digest::{hash_pair, Digest, HashAlgorithm, Hasher, DIGEST_LEN};
pub use error::{CoreError, Result};
pub use merkle::{fold_level, fold_root, MerkleBuilder, MerkleProof, MerkleTree, ProofStep, Side};
pub use state::{
    ByteOrder, DType, EntryValue, StateDict, StateValue, StructuredState, Tensor, TensorView,
};
pub use stream::{ChunkReader, StreamingDigest, DEFAULT_CHUNK_SIZE};
