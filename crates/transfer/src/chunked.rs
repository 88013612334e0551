use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::{MAX_CHUNK_SIZE, TransferError};

/// Length of a chunk checksum in bytes (MD5).
pub const CHECKSUM_LEN: usize = 16;

/// Raw MD5 digest of a chunk payload.
pub type Checksum = [u8; CHECKSUM_LEN];

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes the MD5 digest of `data`.
///
/// Used for corruption detection only, not as a security boundary.
pub fn checksum_bytes(data: &[u8]) -> Checksum {
    let mut hasher = Md5::new();
    hasher.update(data);
    let digest = hasher.finalize();

    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&digest);
    checksum
}

/// Number of chunks a file of `file_size` bytes splits into.
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size as u64)
}

fn check_chunk_size(chunk_size: usize) -> Result<(), TransferError> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(TransferError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// A chunk of source data with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequential chunk index (0-based).
    pub index: u64,
    /// Byte offset within the source.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// MD5 of `data`.
    pub checksum: Checksum,
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a source in fixed-size chunks with automatic MD5 checksums.
///
/// Every chunk except the last is exactly `chunk_size` bytes, regardless of
/// how the underlying reader splits its reads. Reading stops once
/// `total_size` bytes have been produced.
pub struct ChunkReader<R> {
    reader: R,
    chunk_size: usize,
    total_size: u64,
    offset: u64,
    next_index: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wraps `reader`, which must yield at least `total_size` bytes.
    pub fn new(reader: R, total_size: u64, chunk_size: usize) -> Result<Self, TransferError> {
        check_chunk_size(chunk_size)?;
        Ok(Self {
            reader,
            chunk_size,
            total_size,
            offset: 0,
            next_index: 0,
        })
    }

    /// Reads the next chunk. Returns `None` once `total_size` bytes were read.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut data = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.reader.read(&mut data[filled..]).await?;
            if n == 0 {
                return Err(TransferError::SourceShrunk {
                    expected: self.total_size,
                    actual: self.offset + filled as u64,
                });
            }
            filled += n;
        }

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            checksum: checksum_bytes(&data),
            data,
        };
        self.offset += want as u64;
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Declared total size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.total_size - self.offset
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Result of verifying a received chunk against its declared checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkVerdict {
    Verified,
    Mismatch { actual: Checksum },
}

/// Appends received chunks to a destination file, verifying each one.
///
/// A chunk that fails verification is still written; the verdict is
/// returned to the caller for reporting.
pub struct ChunkWriter {
    file: BufWriter<tokio::fs::File>,
    path: PathBuf,
    written: u64,
    chunks: u64,
}

impl ChunkWriter {
    /// Creates (or truncates) the file at `path`.
    pub async fn create(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            written: 0,
            chunks: 0,
        })
    }

    /// Verifies `data` against `expected` and appends it to the file.
    pub async fn write_chunk(
        &mut self,
        data: &[u8],
        expected: &Checksum,
    ) -> Result<ChunkVerdict, TransferError> {
        let actual = checksum_bytes(data);
        let verdict = if actual == *expected {
            ChunkVerdict::Verified
        } else {
            ChunkVerdict::Mismatch { actual }
        };

        self.file.write_all(data).await?;
        self.written += data.len() as u64;
        self.chunks += 1;
        Ok(verdict)
    }

    /// Flushes buffered data and syncs the file to disk.
    ///
    /// Returns the total bytes written.
    pub async fn finish(mut self) -> Result<u64, TransferError> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        Ok(self.written)
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Chunks written so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Destination file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
