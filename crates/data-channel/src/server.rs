//! TCP data server (receiver side).
//!
//! Binds a listener and services incoming transfers strictly one at a time:
//! each accepted connection runs a complete session before the next one is
//! accepted. Senders that connect meanwhile wait in the listener backlog.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filedrop_transfer::{
    ChunkVerdict, ChunkWriter, TransferEvent, TransferProgress,
    resolve_destination, validate_file_name,
};
use tokio::io::{AsyncRead, BufReader};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::DataChannelError;
use crate::wire::{read_chunk_header, read_chunk_payload, read_metadata};
use crate::{ACCEPT_BACKLOG, TCP_BUFFER_SIZE};

/// Pause after a failed accept, so persistent errors (e.g. EMFILE) do not
/// spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Record of one completed receive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    pub peer: SocketAddr,
    /// File name as declared by the sender.
    pub file_name: String,
    /// Where the file was written, after collision resolution.
    pub path: PathBuf,
    pub declared_size: u64,
    pub bytes_received: u64,
    pub chunks: u64,
    /// Indices of chunks whose checksum did not match. Those chunks were
    /// still written.
    pub mismatched_chunks: Vec<u64>,
}

impl ReceiveReport {
    /// True when every chunk verified and the declared size was met.
    pub fn is_verified(&self) -> bool {
        self.mismatched_chunks.is_empty() && self.bytes_received == self.declared_size
    }
}

/// Result of servicing one connection.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed(ReceiveReport),
    Aborted {
        peer: SocketAddr,
        error: DataChannelError,
    },
}

/// TCP data server for receiving file transfers.
pub struct TcpDataServer {
    dest_dir: PathBuf,
    cancel: CancellationToken,
}

impl TcpDataServer {
    pub fn new(dest_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self { dest_dir, cancel }
    }

    /// Directory received files are written to.
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Binds a listener on `host:port` with address reuse enabled.
    pub async fn bind(host: &str, port: u16) -> Result<TcpListener, DataChannelError> {
        let addr_text = format!("{host}:{port}");
        let bind_error = |source: io::Error| DataChannelError::Bind {
            addr: addr_text.clone(),
            source,
        };

        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        };
        let socket = socket.map_err(bind_error)?;
        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(ACCEPT_BACKLOG).map_err(bind_error)?;

        info!(%addr, "TCP data channel listener bound");
        Ok(listener)
    }

    /// Creates the destination directory, binds `host:port`, and serves
    /// until cancelled.
    pub async fn listen(
        &self,
        host: &str,
        port: u16,
        events: mpsc::Sender<TransferEvent>,
        outcomes: mpsc::Sender<TransferOutcome>,
    ) -> Result<(), DataChannelError> {
        tokio::fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|e| DataChannelError::file_access(&self.dest_dir, e))?;
        let listener = Self::bind(host, port).await?;
        self.serve(listener, events, outcomes).await
    }

    /// Accepts connections one at a time until cancelled.
    ///
    /// Each connection carries exactly one session. A failed session is
    /// reported as [`TransferOutcome::Aborted`] and the loop keeps
    /// accepting.
    pub async fn serve(
        &self,
        listener: TcpListener,
        events: mpsc::Sender<TransferEvent>,
        outcomes: mpsc::Sender<TransferOutcome>,
    ) -> Result<(), DataChannelError> {
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            dest = %self.dest_dir.display(),
            "listening for incoming file transfers"
        );

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("TCP data channel: receiver stopped");
                    return Ok(());
                }
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        if self.pause_after_accept_error().await {
                            continue;
                        }
                        info!("TCP data channel: receiver stopped");
                        return Ok(());
                    }
                }
            };

            info!(%peer, "TCP data channel connection accepted");
            let mut reader = BufReader::with_capacity(TCP_BUFFER_SIZE, stream);

            let outcome = match self.receive_session(&mut reader, peer, &events).await {
                Ok(report) => {
                    if report.mismatched_chunks.is_empty() {
                        info!(
                            %peer,
                            path = %report.path.display(),
                            bytes = report.bytes_received,
                            "file received with verified integrity"
                        );
                    } else {
                        warn!(
                            %peer,
                            path = %report.path.display(),
                            corrupted = report.mismatched_chunks.len(),
                            "file received with corrupted chunks"
                        );
                    }
                    TransferOutcome::Completed(report)
                }
                Err(error) => {
                    error!(%peer, %error, "transfer session aborted");
                    TransferOutcome::Aborted { peer, error }
                }
            };

            // Close the connection before reporting.
            drop(reader);

            if outcomes.send(outcome).await.is_err() {
                debug!("outcome receiver dropped");
            }
            debug!("waiting for next file transfer");
        }
    }

    /// Waits before the next accept attempt. Returns false if cancelled
    /// meanwhile.
    async fn pause_after_accept_error(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
        }
    }

    /// Runs one receive session over `reader`.
    ///
    /// Reads the metadata frame, resolves a free destination name, then
    /// writes chunks until the end marker. Checksum mismatches are reported
    /// and the chunk is kept; any read failure aborts the session and
    /// leaves the partial file in place.
    pub async fn receive_session<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        peer: SocketAddr,
        events: &mpsc::Sender<TransferEvent>,
    ) -> Result<ReceiveReport, DataChannelError> {
        let metadata = read_metadata(reader).await?;
        validate_file_name(&metadata.name)?;

        let path = resolve_destination(&self.dest_dir, &metadata.name).await?;
        let mut writer = ChunkWriter::create(&path)
            .await
            .map_err(|e| DataChannelError::destination(&path, e))?;

        info!(
            %peer,
            file = %metadata.name,
            size = metadata.size,
            path = %path.display(),
            "receiving file"
        );
        let _ = events.try_send(TransferEvent::Started {
            file_name: metadata.name.clone(),
            total_bytes: metadata.size,
        });

        let (chunks, mismatched_chunks) =
            match receive_chunks(reader, &mut writer, peer, metadata.size, events).await {
                Ok(received) => received,
                Err(e) => {
                    // Whatever arrived before the failure stays on disk.
                    match finish_destination(writer).await {
                        Ok(bytes) => {
                            debug!(%peer, path = %path.display(), bytes, "partial file kept")
                        }
                        Err(flush) => warn!(%peer, error = %flush, "flushing partial file failed"),
                    }
                    return Err(e);
                }
            };
        debug!(%peer, chunks, "TCP data channel: end marker received");

        let bytes_received = finish_destination(writer).await?;
        if bytes_received != metadata.size {
            warn!(
                %peer,
                declared = metadata.size,
                received = bytes_received,
                "received size differs from declared size"
            );
        }
        let _ = events.try_send(TransferEvent::Finished {
            bytes: bytes_received,
            chunks,
        });

        Ok(ReceiveReport {
            peer,
            file_name: metadata.name,
            path,
            declared_size: metadata.size,
            bytes_received,
            chunks,
            mismatched_chunks,
        })
    }
}

/// Reads chunk frames until the end marker, writing each payload.
///
/// Returns the number of chunks read and the indices of chunks whose
/// checksum did not match.
async fn receive_chunks<R: AsyncRead + Unpin>(
    reader: &mut R,
    writer: &mut ChunkWriter,
    peer: SocketAddr,
    declared_size: u64,
    events: &mpsc::Sender<TransferEvent>,
) -> Result<(u64, Vec<u64>), DataChannelError> {
    let mut mismatched = Vec::new();
    let mut index = 0u64;
    while let Some(header) = read_chunk_header(reader, index).await? {
        let payload = read_chunk_payload(reader, &header, index).await?;

        let written = writer.write_chunk(&payload, &header.checksum).await;
        let verdict = match written {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    %peer,
                    chunk = index,
                    path = %writer.path().display(),
                    error = %e,
                    "writing chunk to destination failed"
                );
                return Err(DataChannelError::destination(writer.path(), e));
            }
        };

        if let ChunkVerdict::Mismatch { actual } = verdict {
            warn!(
                %peer,
                chunk = index,
                expected = %hex::encode(header.checksum),
                actual = %hex::encode(actual),
                "checksum mismatch, data may be corrupted"
            );
            mismatched.push(index);
            let _ = events.try_send(TransferEvent::ChecksumMismatch {
                chunk_index: index,
                expected: header.checksum,
                actual,
            });
        }

        let _ = events.try_send(TransferEvent::Chunk(TransferProgress {
            chunk_index: index,
            bytes_done: writer.written(),
            total_bytes: declared_size,
        }));
        index += 1;
    }
    Ok((index, mismatched))
}

/// Flushes and syncs the destination file, returning the bytes written.
async fn finish_destination(writer: ChunkWriter) -> Result<u64, DataChannelError> {
    let path = writer.path().to_path_buf();
    writer
        .finish()
        .await
        .map_err(|e| DataChannelError::destination(&path, e))
}
