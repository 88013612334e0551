//! Error types for the data channel.

use std::path::PathBuf;

use filedrop_transfer::TransferError;

use crate::wire::Unit;

/// Errors produced by the TCP data channel.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot access {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sending {unit} failed: {source}")]
    Send {
        unit: Unit,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {unit}: {detail}")]
    MalformedHeader { unit: Unit, detail: String },

    #[error("stream truncated in {unit}: expected {expected} bytes, received {received}")]
    TruncatedStream {
        unit: Unit,
        expected: u64,
        received: u64,
    },

    /// A length that cannot be rendered in a 10-digit header. Always a
    /// caller bug; never produced from wire input.
    #[error("header value {0} does not fit in 10 decimal digits")]
    HeaderOverflow(u64),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataChannelError {
    pub(crate) fn file_access(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Maps an I/O failure of the destination file at `path` to `FileAccess`.
    pub(crate) fn destination(path: &std::path::Path, err: TransferError) -> Self {
        match err {
            TransferError::Io(source) => Self::file_access(path, source),
            other => Self::Transfer(other),
        }
    }

    /// Attaches `unit` to a transport write failure.
    pub(crate) fn sending(self, unit: Unit) -> Self {
        match self {
            Self::Io(source) => Self::Send { unit, source },
            other => other,
        }
    }
}
