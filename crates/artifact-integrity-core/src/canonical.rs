//! Canonical hashing of structured state.
//!
//! The digest is a pure function of the sorted `(key, shape, dtype, bytes)`
//! tuples. For each key in byte-wise lexicographic order the hasher absorbs:
//!
//! ```text
//! key_utf8 || 0x00 || shape ("2,3") || 0x00 || dtype ("torch.float32") || 0x00 || data_le
//! ```
//!
//! Element data is always fed little-endian; big-endian tensors are swapped
//! through a bounded scratch buffer. The result is therefore independent of
//! map iteration order and of the byte order the values were held in.
//!
//! **CRITICAL**: This layout is FROZEN. Changing it changes every registered
//! model fingerprint.

use std::collections::HashSet;

use crate::digest::{Digest, HashAlgorithm, Hasher};
use crate::error::{CoreError, Result};
use crate::state::{swap_in_place, ByteOrder, EntryValue, StructuredState, TensorView};

/// Field delimiter; cannot occur inside a key's text.
const DELIMITER: u8 = 0x00;

/// Scratch size for byte-swapping big-endian data.
const SWAP_BUFFER_LEN: usize = 64 * 1024;

/// Hashes a [`StructuredState`] into one order-independent digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalStructureHasher {
    algorithm: HashAlgorithm,
}

impl CanonicalStructureHasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// The algorithm digests are computed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash the state. Any bad entry aborts the whole computation.
    pub fn hash<S: StructuredState + ?Sized>(&self, state: &S) -> Result<Digest> {
        let mut entries = state.entries();

        let mut seen = HashSet::with_capacity(entries.len());
        for (key, _) in &entries {
            if !seen.insert(*key) {
                return Err(CoreError::DuplicateKey((*key).to_string()));
            }
        }

        // str ordering is byte-wise on UTF-8, independent of locale.
        entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        let mut hasher = Hasher::new(self.algorithm);
        for (key, value) in &entries {
            let tensor = match value {
                EntryValue::Tensor(t) => t,
                EntryValue::Unsupported(what) => {
                    return Err(CoreError::unsupported(*key, format!("not a tensor ({})", what)));
                }
            };
            absorb_entry(&mut hasher, key, tensor)?;
        }

        let digest = hasher.finalize();
        tracing::debug!(
            algorithm = %self.algorithm,
            entries = entries.len(),
            digest = %digest,
            "canonical structure hash computed"
        );
        Ok(digest)
    }
}

/// Hash a structured state with SHA-256.
pub fn canonical_state_hash<S: StructuredState + ?Sized>(state: &S) -> Result<Digest> {
    CanonicalStructureHasher::default().hash(state)
}

fn absorb_entry(hasher: &mut Hasher, key: &str, tensor: &TensorView<'_>) -> Result<()> {
    if key.as_bytes().contains(&DELIMITER) {
        return Err(CoreError::unsupported(key, "key contains a NUL byte"));
    }

    let expected = tensor
        .element_count()
        .and_then(|n| n.checked_mul(tensor.dtype.element_size()))
        .ok_or_else(|| CoreError::unsupported(key, "shape overflows"))?;
    if tensor.data.len() != expected {
        return Err(CoreError::unsupported(
            key,
            format!(
                "data is {} bytes, shape [{}] of {} needs {}",
                tensor.data.len(),
                tensor.shape_string(),
                tensor.dtype,
                expected
            ),
        ));
    }

    hasher.update(key.as_bytes());
    hasher.update(&[DELIMITER]);
    hasher.update(tensor.shape_string().as_bytes());
    hasher.update(&[DELIMITER]);
    hasher.update(tensor.dtype.identifier().as_bytes());
    hasher.update(&[DELIMITER]);

    let width = tensor.dtype.swap_width();
    match tensor.byte_order {
        ByteOrder::Big if width > 1 => {
            // Multiple of the swap width so no unit straddles two blocks.
            let block = SWAP_BUFFER_LEN - SWAP_BUFFER_LEN % width;
            let mut scratch = vec![0u8; block.min(tensor.data.len())];
            for piece in tensor.data.chunks(block) {
                let buf = &mut scratch[..piece.len()];
                buf.copy_from_slice(piece);
                swap_in_place(buf, width);
                hasher.update(buf);
            }
        }
        _ => hasher.update(tensor.data),
    }
    Ok(())
}
