//! Chunked file transfer building blocks.
//!
//! Splits a source into checksummed chunks, writes received chunks to a
//! destination file while verifying them, and picks non-colliding
//! destination names. Transport-independent: the data channel crate drives
//! these over TCP.

mod chunked;
mod naming;
mod progress;
mod validation;

pub use chunked::{
    CHECKSUM_LEN, Checksum, Chunk, ChunkReader, ChunkVerdict, ChunkWriter, checksum_bytes,
    chunk_count,
};
pub use naming::{resolve_destination, suffixed_name};
pub use progress::{SpeedCalculator, TransferEvent, TransferProgress};
pub use validation::{MAX_NAME_LEN, validate_file_name};

/// Default chunk size: 4 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest chunk a sender may use and a receiver will accept (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size {0} (must be 1..={max})", max = MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("source shrank while reading: expected {expected} bytes, got {actual}")]
    SourceShrunk { expected: u64, actual: u64 },
}
