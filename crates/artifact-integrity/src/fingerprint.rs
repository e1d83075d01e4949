//! Artifact fingerprinting pipeline.
//!
//! One pass over the raw bytes yields both the flat stream digest and the
//! Merkle leaves. When the caller also supplies the artifact's decoded
//! structured state, its canonical hash becomes the content hash, so two
//! serialisations of the same weights share a fingerprint.

use std::io::Read;
use std::path::Path;

use artifact_integrity_core::{
    CanonicalStructureHasher, ChunkReader, CoreError, Digest, HashAlgorithm, Hasher, MerkleTree,
    StructuredState, DEFAULT_CHUNK_SIZE,
};
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, Result};

/// Accepted artifact types, by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `pt`, `pth`, `ptm`: a serialised state mapping.
    Checkpoint,
    Onnx,
    Binary,
    Tar,
    Zip,
}

impl ArtifactKind {
    /// Classify by extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pt" | "pth" | "ptm" => Some(ArtifactKind::Checkpoint),
            "onnx" => Some(ArtifactKind::Onnx),
            "bin" => Some(ArtifactKind::Binary),
            "tar" => Some(ArtifactKind::Tar),
            "zip" => Some(ArtifactKind::Zip),
            _ => None,
        }
    }

    /// Classify by the path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str());
        ext.and_then(Self::from_extension)
            .ok_or_else(|| IntegrityError::UnsupportedExtension(ext.map(str::to_string)))
    }

    /// Whether a canonical structure hash can stand in for the byte digest.
    pub fn supports_structured_state(&self) -> bool {
        matches!(self, ArtifactKind::Checkpoint)
    }
}

/// How the content hash was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMethod {
    /// Canonical hash of the structured state.
    Canonical,
    /// Flat digest of the raw bytes.
    Stream,
}

/// Everything recorded about one artifact's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFingerprint {
    /// The identity registered for the artifact.
    pub content_hash: Digest,
    pub method: FingerprintMethod,
    /// Flat digest of the raw bytes, whatever `method` is.
    pub stream_digest: Digest,
    /// Merkle root of the raw bytes. Depends on `chunk_size`.
    pub merkle_root: Digest,
    pub chunk_size: usize,
    pub leaf_count: usize,
    pub size_bytes: u64,
    pub algorithm: HashAlgorithm,
}

impl ArtifactFingerprint {
    /// Size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Locator passed to the registrar for a locally stored artifact.
pub fn storage_locator_for(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Computes [`ArtifactFingerprint`]s. Stateless; share freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprinter {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Fingerprinter {
    /// Create a fingerprinter.
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size,
        }
    }

    /// The algorithm digests are computed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Chunk size for the Merkle leaves.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fingerprint the bytes in `source`, optionally preferring the canonical
    /// hash of `state`.
    ///
    /// A state that cannot be hashed is not fatal: the stream digest is used
    /// and a warning logged. A read error is fatal.
    pub fn fingerprint<R: Read>(
        &self,
        source: R,
        state: Option<&dyn StructuredState>,
    ) -> Result<ArtifactFingerprint> {
        let (stream_digest, tree) = self.scan(source)?;

        let (content_hash, method) = match state {
            Some(state) => match CanonicalStructureHasher::new(self.algorithm).hash(state) {
                Ok(digest) => (digest, FingerprintMethod::Canonical),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "canonical hash failed, falling back to stream digest"
                    );
                    (stream_digest, FingerprintMethod::Stream)
                }
            },
            None => (stream_digest, FingerprintMethod::Stream),
        };

        let fingerprint = ArtifactFingerprint {
            content_hash,
            method,
            stream_digest,
            merkle_root: tree.root(),
            chunk_size: self.chunk_size,
            leaf_count: tree.leaf_count(),
            size_bytes: tree.total_bytes(),
            algorithm: self.algorithm,
        };
        tracing::debug!(
            content_hash = %fingerprint.content_hash,
            method = ?fingerprint.method,
            leaves = fingerprint.leaf_count,
            bytes = fingerprint.size_bytes,
            "artifact fingerprinted"
        );
        Ok(fingerprint)
    }

    /// Flat digest and Merkle tree in a single read of the source.
    pub fn scan<R: Read>(&self, source: R) -> std::result::Result<(Digest, MerkleTree), CoreError> {
        let mut reader = ChunkReader::new(source, self.chunk_size)?;
        let mut flat = Hasher::new(self.algorithm);
        let mut leaves = Vec::new();
        while let Some(chunk) = reader.next_chunk()? {
            flat.update(chunk);
            leaves.push(Digest::hash(self.algorithm, chunk));
        }
        let total = reader.bytes_read();
        let tree = MerkleTree::from_leaves(self.algorithm, leaves, self.chunk_size, total);
        Ok((flat.finalize(), tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_integrity_core::{MerkleBuilder, StateDict, StreamingDigest, Tensor};
    use proptest::prelude::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ArtifactKind::from_path(Path::new("m/w.PT")).unwrap(), ArtifactKind::Checkpoint);
        assert_eq!(ArtifactKind::from_path(Path::new("w.ptm")).unwrap(), ArtifactKind::Checkpoint);
        assert_eq!(ArtifactKind::from_path(Path::new("w.onnx")).unwrap(), ArtifactKind::Onnx);
        assert!(ArtifactKind::Checkpoint.supports_structured_state());
        assert!(!ArtifactKind::Zip.supports_structured_state());

        match ArtifactKind::from_path(Path::new("notes.txt")) {
            Err(IntegrityError::UnsupportedExtension(Some(ext))) => assert_eq!(ext, "txt"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            ArtifactKind::from_path(Path::new("Makefile")),
            Err(IntegrityError::UnsupportedExtension(None))
        ));
    }

    #[test]
    fn test_single_pass_matches_separate_passes() {
        let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let fp = Fingerprinter::new(HashAlgorithm::Sha256, 4096)
            .fingerprint(Cursor::new(&bytes), None)
            .unwrap();

        let flat = StreamingDigest::new().digest(Cursor::new(&bytes)).unwrap();
        let root = MerkleBuilder::new().chunk_size(4096).root(Cursor::new(&bytes)).unwrap();
        assert_eq!(fp.content_hash, flat);
        assert_eq!(fp.stream_digest, flat);
        assert_eq!(fp.merkle_root, root);
        assert_eq!(fp.leaf_count, 3);
        assert_eq!(fp.size_bytes, 10_000);
        assert_eq!(fp.method, FingerprintMethod::Stream);
    }

    #[test]
    fn test_structured_state_preferred() {
        let state = StateDict::new().with("w", Tensor::from_f32(vec![2], &[1.0, 2.0]));
        let fp = Fingerprinter::default()
            .fingerprint(Cursor::new(b"pickle bytes"), Some(&state))
            .unwrap();
        assert_eq!(fp.method, FingerprintMethod::Canonical);
        assert_ne!(fp.content_hash, fp.stream_digest);
        assert_eq!(
            fp.content_hash,
            CanonicalStructureHasher::new(HashAlgorithm::Sha256).hash(&state).unwrap()
        );
    }

    #[test]
    fn test_unhashable_state_falls_back() {
        let mut state = StateDict::new();
        state.insert_opaque("optimizer", "python object");
        let fp = Fingerprinter::default()
            .fingerprint(Cursor::new(b"pickle bytes"), Some(&state))
            .unwrap();
        assert_eq!(fp.method, FingerprintMethod::Stream);
        assert_eq!(fp.content_hash, fp.stream_digest);
    }

    #[test]
    fn test_empty_artifact() {
        let fp = Fingerprinter::default().fingerprint(Cursor::new(Vec::new()), None).unwrap();
        let empty = Digest::empty(HashAlgorithm::Sha256);
        assert_eq!(fp.content_hash, empty);
        assert_eq!(fp.merkle_root, empty);
        assert_eq!(fp.leaf_count, 0);
        assert_eq!(fp.size_mb(), 0.0);
    }

    #[test]
    fn test_invalid_chunk_size() {
        let err = Fingerprinter::new(HashAlgorithm::Sha256, 0)
            .fingerprint(Cursor::new(b"x"), None)
            .unwrap_err();
        assert!(matches!(err, IntegrityError::Core(CoreError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_storage_locator_and_size() {
        assert_eq!(
            storage_locator_for(&PathBuf::from("/srv/uploads/models/a.pt")),
            "file:///srv/uploads/models/a.pt"
        );
        let fp = Fingerprinter::default()
            .fingerprint(Cursor::new(vec![0u8; 3 * 1024 * 1024 / 2]), None)
            .unwrap();
        assert_eq!(fp.size_mb(), 1.5);
    }

    proptest! {
        #[test]
        fn test_merkle_root_matches_builder(
            bytes in prop::collection::vec(any::<u8>(), 0..2048),
            chunk in 1usize..300,
        ) {
            let fp = Fingerprinter::new(HashAlgorithm::Blake3, chunk)
                .fingerprint(Cursor::new(&bytes), None)
                .unwrap();
            let root = MerkleBuilder::new()
                .algorithm(HashAlgorithm::Blake3)
                .chunk_size(chunk)
                .root(Cursor::new(&bytes))
                .unwrap();
            prop_assert_eq!(fp.merkle_root, root);
            prop_assert_eq!(fp.size_bytes, bytes.len() as u64);
        }
    }
}
