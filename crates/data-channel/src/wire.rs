//! TCP wire format for single-file transfers.
//!
//! Every unit is preceded by a 10-byte header: the unit's length as ASCII
//! decimal, zero-padded. A header of all zeros where a chunk is expected is
//! the end marker.
//!
//! # Wire format
//!
//! ```text
//! METADATA (Sender -> Receiver):
//!   [10 bytes: ASCII length L]
//!   [L bytes: "<name>|<size>" UTF-8]
//!
//! PER CHUNK:
//!   [10 bytes: "0000000026"]
//!   [16 bytes: MD5 of payload]
//!   [10 bytes: ASCII payload length P]
//!   [P bytes: raw payload]
//!
//! END MARKER: [10 bytes: "0000000000"]
//! ```
//!
//! The chunk header record reuses the header encoding for its length field,
//! so the payload is always directly preceded by its own 10-byte length.

use std::fmt;

use filedrop_transfer::{CHECKSUM_LEN, Checksum, Chunk, MAX_CHUNK_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::DataChannelError;

/// Length of every frame header.
pub const HEADER_LEN: usize = 10;

/// Largest value a 10-digit header can carry.
pub const MAX_HEADER_VALUE: u64 = 9_999_999_999;

/// Header signalling that no further chunks follow.
pub const END_MARKER: [u8; HEADER_LEN] = *b"0000000000";

/// Serialized length of a chunk header record.
pub const CHUNK_HEADER_LEN: usize = CHECKSUM_LEN + HEADER_LEN;

/// Largest metadata record a receiver accepts.
pub const MAX_METADATA_LEN: usize = 64 * 1024;

const METADATA_SEPARATOR: char = '|';

/// The unit being read or written, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// A bare frame header with no context.
    Header,
    Metadata,
    ChunkHeader(u64),
    ChunkPayload(u64),
    /// A whole chunk frame, header and payload.
    Chunk(u64),
    EndMarker,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Header => f.write_str("frame header"),
            Unit::Metadata => f.write_str("metadata frame"),
            Unit::ChunkHeader(index) => write!(f, "chunk {index} header"),
            Unit::ChunkPayload(index) => write!(f, "chunk {index} payload"),
            Unit::Chunk(index) => write!(f, "chunk {index}"),
            Unit::EndMarker => f.write_str("end marker"),
        }
    }
}

fn malformed(unit: Unit, detail: impl Into<String>) -> DataChannelError {
    DataChannelError::MalformedHeader {
        unit,
        detail: detail.into(),
    }
}

// ---------------------------------------------------------------------------
// Header codec
// ---------------------------------------------------------------------------

/// Renders `value` as exactly 10 zero-padded ASCII digits.
pub fn encode_header(value: u64) -> Result<[u8; HEADER_LEN], DataChannelError> {
    if value > MAX_HEADER_VALUE {
        return Err(DataChannelError::HeaderOverflow(value));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(format!("{value:010}").as_bytes());
    Ok(header)
}

/// Parses a 10-byte header.
///
/// Fewer than 10 bytes is a truncated stream; anything other than exactly
/// 10 ASCII digits is malformed.
pub fn decode_header(bytes: &[u8]) -> Result<u64, DataChannelError> {
    decode_header_for(bytes, Unit::Header)
}

fn decode_header_for(bytes: &[u8], unit: Unit) -> Result<u64, DataChannelError> {
    if bytes.len() < HEADER_LEN {
        return Err(DataChannelError::TruncatedStream {
            unit,
            expected: HEADER_LEN as u64,
            received: bytes.len() as u64,
        });
    }
    parse_digits(bytes).ok_or_else(|| {
        malformed(
            unit,
            format!(
                "expected {HEADER_LEN} ASCII digits, got {:?}",
                String::from_utf8_lossy(bytes)
            ),
        )
    })
}

fn parse_digits(bytes: &[u8]) -> Option<u64> {
    if bytes.len() != HEADER_LEN || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0')),
    )
}

// ---------------------------------------------------------------------------
// Framed stream primitives
// ---------------------------------------------------------------------------

/// Fills `buf` completely. Early EOF or a failed read reports `unit` as
/// truncated.
async fn read_unit<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    unit: Unit,
) -> Result<(), DataChannelError> {
    let expected = buf.len() as u64;
    let mut filled = 0;
    while filled < buf.len() {
        let n = match reader.read(&mut buf[filled..]).await {
            Ok(n) => n,
            Err(e) => {
                debug!(%unit, received = filled, error = %e, "read failed");
                return Err(DataChannelError::TruncatedStream {
                    unit,
                    expected,
                    received: filled as u64,
                });
            }
        };
        if n == 0 {
            return Err(DataChannelError::TruncatedStream {
                unit,
                expected,
                received: filled as u64,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Reads the 10-byte header preceding `unit`.
pub async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    unit: Unit,
) -> Result<u64, DataChannelError> {
    let mut buf = [0u8; HEADER_LEN];
    read_unit(reader, &mut buf, unit).await?;
    decode_header_for(&buf, unit)
}

/// Writes `body` preceded by its header.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), DataChannelError> {
    let header = encode_header(body.len() as u64)?;
    writer.write_all(&header).await?;
    writer.write_all(body).await?;
    Ok(())
}

/// Reads one header-then-body frame.
///
/// Returns `None` for a zero-length header (the end marker). Bodies longer
/// than `max_len` are rejected before anything is allocated.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    unit: Unit,
    max_len: usize,
) -> Result<Option<Vec<u8>>, DataChannelError> {
    let len = read_header(reader, unit).await?;
    if len == 0 {
        return Ok(None);
    }
    if len > max_len as u64 {
        return Err(malformed(
            unit,
            format!("length {len} exceeds limit of {max_len} bytes"),
        ));
    }

    let mut body = vec![0u8; len as usize];
    read_unit(reader, &mut body, unit).await?;
    Ok(Some(body))
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// File metadata sent before any chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Bare file name (no directories).
    pub name: String,
    /// Exact number of payload bytes that follow.
    pub size: u64,
}

impl Metadata {
    /// Serializes to `"<name>|<size>"`.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}{}{}", self.name, METADATA_SEPARATOR, self.size).into_bytes()
    }

    /// Parses a metadata record. The size follows the last `|`, so names
    /// may themselves contain `|`.
    pub fn decode(bytes: &[u8]) -> Result<Self, DataChannelError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| malformed(Unit::Metadata, format!("invalid UTF-8: {e}")))?;

        let (name, size) = text
            .rsplit_once(METADATA_SEPARATOR)
            .ok_or_else(|| malformed(Unit::Metadata, "missing '|' separator"))?;

        if name.is_empty() {
            return Err(malformed(Unit::Metadata, "empty file name"));
        }
        if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed(Unit::Metadata, format!("invalid size {size:?}")));
        }
        let size = size
            .parse::<u64>()
            .map_err(|e| malformed(Unit::Metadata, format!("invalid size {size:?}: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            size,
        })
    }
}

/// Writes the metadata frame.
pub async fn write_metadata<W: AsyncWrite + Unpin>(
    writer: &mut W,
    metadata: &Metadata,
) -> Result<(), DataChannelError> {
    write_frame(writer, &metadata.encode()).await
}

/// Reads and decodes the metadata frame.
pub async fn read_metadata<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Metadata, DataChannelError> {
    match read_frame(reader, Unit::Metadata, MAX_METADATA_LEN).await? {
        Some(body) => Metadata::decode(&body),
        None => Err(malformed(
            Unit::Metadata,
            "end marker where metadata was expected",
        )),
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Per-chunk header record: payload checksum and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub checksum: Checksum,
    pub payload_len: u64,
}

impl ChunkHeader {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            checksum: chunk.checksum,
            payload_len: chunk.data.len() as u64,
        }
    }

    /// Serializes to 16 checksum bytes followed by a 10-digit length.
    pub fn encode(&self) -> Result<[u8; CHUNK_HEADER_LEN], DataChannelError> {
        let mut record = [0u8; CHUNK_HEADER_LEN];
        record[..CHECKSUM_LEN].copy_from_slice(&self.checksum);
        record[CHECKSUM_LEN..].copy_from_slice(&encode_header(self.payload_len)?);
        Ok(record)
    }

    /// Parses the header record of chunk `index`.
    pub fn decode(bytes: &[u8], index: u64) -> Result<Self, DataChannelError> {
        let unit = Unit::ChunkHeader(index);
        if bytes.len() != CHUNK_HEADER_LEN {
            return Err(malformed(
                unit,
                format!(
                    "record is {} bytes, expected {CHUNK_HEADER_LEN}",
                    bytes.len()
                ),
            ));
        }

        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[..CHECKSUM_LEN]);
        let payload_len = decode_header_for(&bytes[CHECKSUM_LEN..], unit)?;

        if payload_len == 0 || payload_len > MAX_CHUNK_SIZE as u64 {
            return Err(malformed(
                unit,
                format!("payload length {payload_len} outside 1..={MAX_CHUNK_SIZE}"),
            ));
        }

        Ok(Self {
            checksum,
            payload_len,
        })
    }
}

/// Writes a chunk header frame followed by the raw payload.
pub async fn write_chunk<W: AsyncWrite + Unpin>(
    writer: &mut W,
    chunk: &Chunk,
) -> Result<(), DataChannelError> {
    let record = ChunkHeader::from_chunk(chunk).encode()?;
    write_frame(writer, &record).await?;
    writer.write_all(&chunk.data).await?;
    Ok(())
}

/// Reads the header frame of chunk `index`.
///
/// Returns `None` when the end marker is read instead.
pub async fn read_chunk_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    index: u64,
) -> Result<Option<ChunkHeader>, DataChannelError> {
    match read_frame(reader, Unit::ChunkHeader(index), CHUNK_HEADER_LEN).await? {
        Some(record) => ChunkHeader::decode(&record, index).map(Some),
        None => Ok(None),
    }
}

/// Reads exactly `header.payload_len` payload bytes of chunk `index`.
pub async fn read_chunk_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    header: &ChunkHeader,
    index: u64,
) -> Result<Vec<u8>, DataChannelError> {
    let mut payload = vec![0u8; header.payload_len as usize];
    read_unit(reader, &mut payload, Unit::ChunkPayload(index)).await?;
    Ok(payload)
}

/// Writes the end-of-transfer marker.
pub async fn write_end_marker<W: AsyncWrite + Unpin>(
    writer: &mut W,
) -> Result<(), DataChannelError> {
    writer.write_all(&END_MARKER).await?;
    Ok(())
}
