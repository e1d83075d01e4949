//! Golden test vectors for deterministic verification.
//!
//! Expected values were computed with an independent SHA-256 implementation.
//! Any change to chunking, Merkle folding, or canonical state encoding shows
//! up here first.

use std::io::Cursor;

use artifact_integrity_core::{
    CanonicalStructureHasher, HashAlgorithm, MerkleBuilder, StateDict, StreamingDigest, Tensor,
};

/// Byte pattern used by large vectors: byte `i` is `i % 251`.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// A golden byte-stream vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Input length; the bytes are [`pattern_bytes`] unless `literal` is set.
    pub len: usize,
    pub literal: Option<&'static [u8]>,
    /// Merkle leaf size.
    pub chunk_size: usize,
    /// Expected flat digest (hex).
    pub expected_digest: &'static str,
    /// Expected Merkle root (hex).
    pub expected_root: &'static str,
    pub expected_leaves: usize,
}

impl GoldenVector {
    /// The input bytes for this vector.
    pub fn input(&self) -> Vec<u8> {
        match self.literal {
            Some(bytes) => bytes.to_vec(),
            None => pattern_bytes(self.len),
        }
    }
}

const MIB: usize = 1024 * 1024;

/// Get all byte-stream vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "empty",
            len: 0,
            literal: Some(b""),
            chunk_size: 4 * MIB,
            expected_digest: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            expected_root: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            expected_leaves: 0,
        },
        GoldenVector {
            name: "abc",
            len: 3,
            literal: Some(b"abc"),
            chunk_size: 4 * MIB,
            expected_digest: "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            expected_root: "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            expected_leaves: 1,
        },
        GoldenVector {
            name: "hello world / 4",
            len: 11,
            literal: Some(b"hello world"),
            chunk_size: 4,
            expected_digest: "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            expected_root: "04157d361d69387d157fd74183bf2f2a39f2863117b193befe6d7df97ade8b25",
            expected_leaves: 3,
        },
        GoldenVector {
            name: "hello world / 1",
            len: 11,
            literal: Some(b"hello world"),
            chunk_size: 1,
            expected_digest: "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            expected_root: "2266fb6810cbe5c34ac4ca0bb335abfd7018b999473a035046bda9ae11a72962",
            expected_leaves: 11,
        },
        GoldenVector {
            name: "10 MiB pattern",
            len: 10 * MIB,
            literal: None,
            chunk_size: 4 * MIB,
            expected_digest: "44f9296993796e201208c6c245b9515d36b62c87d0be4459ff347bfa054cd527",
            expected_root: "490e06954325422e7fca42d1adadbfd88c32f9f7c89ea2e3db5964c4ff9c97ef",
            expected_leaves: 3,
        },
    ]
}

/// A golden canonical-state vector.
#[derive(Debug, Clone)]
pub struct StateVector {
    pub name: &'static str,
    pub state: StateDict,
    pub expected_hash: &'static str,
}

/// Get all canonical-state vectors.
pub fn state_vectors() -> Vec<StateVector> {
    vec![
        StateVector {
            name: "linear layer",
            state: StateDict::new()
                .with("weight", Tensor::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]))
                .with("bias", Tensor::from_f32(vec![2], &[0.5, -0.5])),
            expected_hash: "00570a598fa80888c5e697cb44948d2b1f366ee955f6c98f572f7bbed0f9636f",
        },
        StateVector {
            name: "scalar step",
            state: StateDict::new().with("step", Tensor::from_i64(vec![], &[7])),
            expected_hash: "62153aa3d3c02bf353a8cd36d8f0464b4f692cf86828bf046a91db08a55e4275",
        },
    ]
}

/// Check every vector. Returns `(name, matches, actual)` per check.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    for v in all_vectors() {
        let input = v.input();
        let digest = StreamingDigest::new()
            .digest(Cursor::new(&input))
            .map(|d| d.to_hex())
            .unwrap_or_else(|e| e.to_string());
        results.push((format!("{} digest", v.name), digest == v.expected_digest, digest));

        let root = MerkleBuilder::new()
            .chunk_size(v.chunk_size)
            .build(Cursor::new(&input))
            .map(|t| format!("{}/{}", t.root(), t.leaf_count()))
            .unwrap_or_else(|e| e.to_string());
        let expected = format!("{}/{}", v.expected_root, v.expected_leaves);
        results.push((format!("{} root", v.name), root == expected, root));
    }

    let hasher = CanonicalStructureHasher::new(HashAlgorithm::Sha256);
    for v in state_vectors() {
        let hash = hasher
            .hash(&v.state)
            .map(|d| d.to_hex())
            .unwrap_or_else(|e| e.to_string());
        results.push((v.name.to_string(), hash == v.expected_hash, hash));
    }

    results
}
