//! Streaming digests over sequential byte sources.
//!
//! Sources are consumed in fixed-size chunks so an artifact of any size is
//! hashed with a bounded buffer. The flat digest is cumulative: the chunk
//! size changes how often the hash state is updated, never the result.

use std::io::{ErrorKind, Read};

use crate::digest::{Digest, HashAlgorithm, Hasher};
use crate::error::{CoreError, Result};

/// Default chunk size (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Reads a source in chunks of exactly `chunk_size` bytes.
///
/// Short reads are retried until the buffer is full or the source is
/// exhausted, so chunk boundaries depend only on the content and the chunk
/// size. The final chunk may be shorter; no empty trailing chunk is ever
/// produced.
pub struct ChunkReader<R> {
    source: R,
    buf: Vec<u8>,
    exhausted: bool,
    bytes_read: u64,
}

impl<R: Read> ChunkReader<R> {
    /// Wrap a source. Fails if `chunk_size` is zero.
    pub fn new(source: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CoreError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            source,
            buf: vec![0u8; chunk_size],
            exhausted: false,
            bytes_read: 0,
        })
    }

    /// Read the next chunk, or `None` once the source is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut filled = 0;
        while filled < self.buf.len() {
            match self.source.read(&mut self.buf[filled..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CoreError::Io(e)),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        self.bytes_read += filled as u64;
        Ok(Some(&self.buf[..filled]))
    }

    /// Total bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.buf.len()
    }

    /// Recover the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }
}

/// Flat digest of a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingDigest {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Default for StreamingDigest {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl StreamingDigest {
    /// SHA-256 with the default chunk size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different hash algorithm.
    pub fn algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use a different chunk size. Validated when hashing.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Hash the whole source.
    ///
    /// An empty source yields [`Digest::empty`]. On a read error nothing is
    /// returned.
    pub fn digest<R: Read>(&self, source: R) -> Result<Digest> {
        self.digest_counted(source).map(|(digest, _)| digest)
    }

    /// Hash the whole source and report how many bytes it held.
    pub fn digest_counted<R: Read>(&self, source: R) -> Result<(Digest, u64)> {
        let mut reader = ChunkReader::new(source, self.chunk_size)?;
        let mut hasher = Hasher::new(self.algorithm);
        while let Some(chunk) = reader.next_chunk()? {
            hasher.update(chunk);
        }
        let digest = hasher.finalize();
        tracing::debug!(
            algorithm = %self.algorithm,
            bytes = reader.bytes_read(),
            digest = %digest,
            "stream digest computed"
        );
        Ok((digest, reader.bytes_read()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{self, Cursor};

    /// Returns at most `step` bytes per read call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::PermissionDenied, "nope"))
        }
    }

    #[test]
    fn test_chunk_reader_boundaries() {
        let data = b"hello world";
        let mut reader = ChunkReader::new(Trickle { data, step: 3 }, 4).unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            chunks.push(chunk.to_vec());
        }
        assert_eq!(chunks, vec![b"hell".to_vec(), b"o wo".to_vec(), b"rld".to_vec()]);
        assert_eq!(reader.bytes_read(), 11);
    }

    #[test]
    fn test_chunk_reader_exact_multiple_has_no_empty_tail() {
        let mut reader = ChunkReader::new(Cursor::new(vec![7u8; 8]), 4).unwrap();
        assert_eq!(reader.next_chunk().unwrap().map(<[u8]>::len), Some(4));
        assert_eq!(reader.next_chunk().unwrap().map(<[u8]>::len), Some(4));
        assert!(reader.next_chunk().unwrap().is_none());
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = StreamingDigest::new()
            .chunk_size(0)
            .digest(Cursor::new(b"abc"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidChunkSize(0)));
    }

    #[test]
    fn test_empty_source_is_empty_digest() {
        let d = StreamingDigest::new().digest(io::empty()).unwrap();
        assert_eq!(d, Digest::empty(HashAlgorithm::Sha256));
    }

    #[test]
    fn test_known_value() {
        let d = StreamingDigest::new()
            .chunk_size(4)
            .digest(Cursor::new(b"hello world"))
            .unwrap();
        assert_eq!(
            d.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_io_error_is_distinct() {
        let err = StreamingDigest::new().digest(Broken).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_counted_reports_length() {
        let (_, n) = StreamingDigest::new()
            .digest_counted(Cursor::new(vec![1u8; 1000]))
            .unwrap();
        assert_eq!(n, 1000);
    }

    proptest! {
        #[test]
        fn test_chunk_size_never_changes_digest(
            data in prop::collection::vec(any::<u8>(), 0..4096),
            chunk in 1usize..600,
            step in 1usize..97,
        ) {
            let reference = StreamingDigest::new()
                .digest(Cursor::new(&data))
                .unwrap();
            let one = StreamingDigest::new()
                .chunk_size(1)
                .digest(Cursor::new(&data))
                .unwrap();
            let other = StreamingDigest::new()
                .chunk_size(chunk)
                .digest(Trickle { data: &data, step })
                .unwrap();
            prop_assert_eq!(reference, one);
            prop_assert_eq!(reference, other);
            prop_assert_eq!(reference, Digest::hash(HashAlgorithm::Sha256, &data));
        }
    }
}
