//! TCP data client (sender side).
//!
//! Connects to a receiver and streams one file as a metadata frame,
//! checksummed chunks, and the end marker.

use std::io;
use std::path::Path;

use filedrop_transfer::{
    ChunkReader, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, TransferError, TransferEvent,
    TransferProgress, chunk_count, validate_file_name,
};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::TCP_BUFFER_SIZE;
use crate::error::DataChannelError;
use crate::wire::{Metadata, Unit, write_chunk, write_end_marker, write_metadata};

/// Summary of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file_name: String,
    pub bytes_sent: u64,
    pub chunks_sent: u64,
}

/// TCP data client for sending a single file.
#[derive(Debug, Clone)]
pub struct TcpDataClient {
    chunk_size: usize,
}

impl Default for TcpDataClient {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TcpDataClient {
    /// Creates a client that splits files into `chunk_size`-byte chunks.
    pub fn new(chunk_size: usize) -> Result<Self, DataChannelError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::InvalidChunkSize(chunk_size).into());
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sends the file at `path` to the receiver at `host:port`.
    ///
    /// The file is checked before connecting, so a missing source never
    /// opens a session on the receiver.
    pub async fn send(
        &self,
        path: &Path,
        host: &str,
        port: u16,
        events: mpsc::Sender<TransferEvent>,
    ) -> Result<TransferReport, DataChannelError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DataChannelError::file_access(path, e))?;
        if !metadata.is_file() {
            return Err(DataChannelError::file_access(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        source_file_name(path)?;

        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| DataChannelError::Connection {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, "TCP data channel connected");

        let mut writer = BufWriter::with_capacity(TCP_BUFFER_SIZE, stream);
        let report = self.send_to(path, &mut writer, &events).await?;
        writer
            .shutdown()
            .await
            .map_err(|e| DataChannelError::Io(e).sending(Unit::EndMarker))?;
        Ok(report)
    }

    /// Streams the file at `path` into `writer` using the wire format.
    ///
    /// Progress is reported on `events` without blocking; a full or closed
    /// channel drops events.
    pub async fn send_to<W: AsyncWrite + Unpin>(
        &self,
        path: &Path,
        writer: &mut W,
        events: &mpsc::Sender<TransferEvent>,
    ) -> Result<TransferReport, DataChannelError> {
        let file_name = source_file_name(path)?;
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DataChannelError::file_access(path, e))?;
        let file_size = file
            .metadata()
            .await
            .map_err(|e| DataChannelError::file_access(path, e))?
            .len();

        write_metadata(
            writer,
            &Metadata {
                name: file_name.clone(),
                size: file_size,
            },
        )
        .await
        .map_err(|e| e.sending(Unit::Metadata))?;
        let _ = events.try_send(TransferEvent::Started {
            file_name: file_name.clone(),
            total_bytes: file_size,
        });

        let total_chunks = chunk_count(file_size, self.chunk_size);
        let mut chunks = ChunkReader::new(file, file_size, self.chunk_size)?;
        let mut chunks_sent = 0u64;

        while let Some(chunk) = chunks.next_chunk().await? {
            write_chunk(writer, &chunk)
                .await
                .map_err(|e| e.sending(Unit::Chunk(chunk.index)))?;
            chunks_sent += 1;

            debug!(
                chunk = chunk.index + 1,
                total_chunks,
                bytes = chunks.offset(),
                "TCP data channel: chunk sent"
            );
            let _ = events.try_send(TransferEvent::Chunk(TransferProgress {
                chunk_index: chunk.index,
                bytes_done: chunks.offset(),
                total_bytes: file_size,
            }));
        }

        write_end_marker(writer)
            .await
            .map_err(|e| e.sending(Unit::EndMarker))?;
        writer
            .flush()
            .await
            .map_err(|e| DataChannelError::Io(e).sending(Unit::EndMarker))?;

        let _ = events.try_send(TransferEvent::Finished {
            bytes: file_size,
            chunks: chunks_sent,
        });
        info!(
            file = %file_name,
            bytes = file_size,
            chunks = chunks_sent,
            "TCP data channel: file sent"
        );

        Ok(TransferReport {
            file_name,
            bytes_sent: file_size,
            chunks_sent,
        })
    }
}

/// Bare name the receiver will be asked to store the file under.
fn source_file_name(path: &Path) -> Result<String, DataChannelError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TransferError::InvalidName(format!("{} has no UTF-8 file name", path.display()))
        })?;
    validate_file_name(name)?;
    Ok(name.to_string())
}
