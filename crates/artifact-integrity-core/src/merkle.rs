//! Binary Merkle trees over fixed-size chunks of a byte stream.
//!
//! Construction rules:
//! - One leaf per chunk: `leaf = H(chunk)`
//! - Parents pair consecutive nodes: `parent = H(left || right)`
//! - A level with an odd node count pairs its last node with itself
//! - Zero chunks: the root is `H("")`, the same value the flat digest gives
//!   an empty source, so an empty artifact has one sentinel fingerprint
//!
//! Unlike the flat digest, the root depends on the chunk size.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::digest::{hash_pair, Digest, HashAlgorithm};
use crate::error::{CoreError, Result};
use crate::stream::{ChunkReader, DEFAULT_CHUNK_SIZE};

/// Builds Merkle trees from byte sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleBuilder {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for MerkleBuilder {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MerkleBuilder {
    /// SHA-256 over 4 MiB chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different hash algorithm.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use a different chunk size. Validated when building.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Hash every chunk of the source into a leaf.
    pub fn leaves<R: Read>(&self, source: R) -> Result<(Vec<Digest>, u64)> {
        let mut reader = ChunkReader::new(source, self.chunk_size)?;
        let mut leaves = Vec::new();
        while let Some(chunk) = reader.next_chunk()? {
            leaves.push(Digest::hash(self.algorithm, chunk));
        }
        Ok((leaves, reader.bytes_read()))
    }

    /// Build the full tree, keeping every level.
    pub fn build<R: Read>(&self, source: R) -> Result<MerkleTree> {
        let (leaves, total_bytes) = self.leaves(source)?;
        let tree = MerkleTree::from_leaves(self.algorithm, leaves, self.chunk_size, total_bytes);
        tracing::debug!(
            algorithm = %self.algorithm,
            chunk_size = self.chunk_size,
            leaves = tree.leaf_count(),
            bytes = total_bytes,
            root = %tree.root(),
            "merkle tree built"
        );
        Ok(tree)
    }

    /// Compute only the root, holding one level at a time.
    pub fn root<R: Read>(&self, source: R) -> Result<Digest> {
        let (leaves, _) = self.leaves(source)?;
        Ok(fold_root(self.algorithm, leaves))
    }
}

/// Fold one level into the next: pair `(i, i + 1)`, duplicating an odd tail.
pub fn fold_level(algorithm: HashAlgorithm, level: &[Digest]) -> Vec<Digest> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            hash_pair(algorithm, left, right)
        })
        .collect()
}

/// Fold leaves all the way up to the root.
pub fn fold_root(algorithm: HashAlgorithm, leaves: Vec<Digest>) -> Digest {
    if leaves.is_empty() {
        return Digest::empty(algorithm);
    }
    let mut level = leaves;
    while level.len() > 1 {
        level = fold_level(algorithm, &level);
    }
    level[0]
}

/// A fully materialised Merkle tree.
///
/// Deserialisation rebuilds the tree from its leaves and rejects input whose
/// stored levels or size disagree with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTree")]
pub struct MerkleTree {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    total_bytes: u64,
    /// `levels[0]` are the leaves, the last level holds the root.
    /// Empty when there are no leaves.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from precomputed leaf digests.
    pub fn from_leaves(
        algorithm: HashAlgorithm,
        leaves: Vec<Digest>,
        chunk_size: usize,
        total_bytes: u64,
    ) -> Self {
        let mut levels = Vec::new();
        if !leaves.is_empty() {
            levels.push(leaves);
            while let Some(top) = levels.last().filter(|l| l.len() > 1) {
                let next = fold_level(algorithm, top);
                levels.push(next);
            }
        }
        Self {
            algorithm,
            chunk_size,
            total_bytes,
            levels,
        }
    }

    /// The root digest (the fingerprint).
    pub fn root(&self) -> Digest {
        self.levels
            .last()
            .map(|top| top[0])
            .unwrap_or_else(|| Digest::empty(self.algorithm))
    }

    /// Leaf digests in chunk order.
    pub fn leaves(&self) -> &[Digest] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of leaves (chunks).
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Number of levels including leaves and root; zero for an empty tree.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// All levels, leaves first.
    pub fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    /// The algorithm the tree was built with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Chunk size the leaves were cut at.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes consumed to build the tree.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut steps = Vec::with_capacity(self.depth().saturating_sub(1));
        let mut pos = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if pos % 2 == 0 {
                // Odd tail pairs with itself.
                let sibling = level.get(pos + 1).unwrap_or(&level[pos]);
                ProofStep {
                    sibling: *sibling,
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling: level[pos - 1],
                    side: Side::Left,
                }
            };
            steps.push(step);
            pos /= 2;
        }

        Some(MerkleProof {
            algorithm: self.algorithm,
            leaf_index: index,
            leaf_count: self.leaf_count(),
            steps,
        })
    }
}

/// Unchecked wire shape of a [`MerkleTree`].
#[derive(Deserialize)]
struct RawTree {
    algorithm: HashAlgorithm,
    chunk_size: usize,
    total_bytes: u64,
    levels: Vec<Vec<Digest>>,
}

impl TryFrom<RawTree> for MerkleTree {
    type Error = CoreError;

    fn try_from(raw: RawTree) -> Result<Self> {
        if raw.chunk_size == 0 {
            return Err(CoreError::InvalidChunkSize(0));
        }
        let leaves = raw.levels.first().cloned().unwrap_or_default();
        let chunk = raw.chunk_size as u64;
        let expected_leaves = (raw.total_bytes + chunk - 1) / chunk;
        if leaves.len() as u64 != expected_leaves {
            return Err(CoreError::InvalidTree(format!(
                "{} leaves for {} bytes in {}-byte chunks",
                leaves.len(),
                raw.total_bytes,
                raw.chunk_size
            )));
        }

        let tree = MerkleTree::from_leaves(raw.algorithm, leaves, raw.chunk_size, raw.total_bytes);
        if tree.levels != raw.levels {
            return Err(CoreError::InvalidTree(
                "stored levels do not fold from the leaves".to_string(),
            ));
        }
        Ok(tree)
    }
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One sibling on the path from a leaf to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub side: Side,
}

/// Evidence that one chunk belongs to a tree with a given root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub algorithm: HashAlgorithm,
    pub leaf_index: usize,
    pub leaf_count: usize,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from a leaf digest.
    pub fn compute_root(&self, leaf: &Digest) -> Digest {
        self.steps.iter().fold(*leaf, |acc, step| match step.side {
            Side::Right => hash_pair(self.algorithm, &acc, &step.sibling),
            Side::Left => hash_pair(self.algorithm, &step.sibling, &acc),
        })
    }

    /// Check a leaf digest against an expected root.
    pub fn verify(&self, leaf: &Digest, root: &Digest) -> bool {
        self.compute_root(leaf) == *root
    }

    /// Check raw chunk bytes against an expected root.
    pub fn verify_chunk(&self, chunk: &[u8], root: &Digest) -> bool {
        self.verify(&Digest::hash(self.algorithm, chunk), root)
    }
}
