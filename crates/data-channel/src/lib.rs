//! TCP data channel for single-file transfers.
//!
//! One connection carries one file: a metadata frame, a sequence of
//! MD5-checksummed chunks, and an end marker. [`TcpDataClient`] is the
//! sending side; [`TcpDataServer`] receives, servicing connections strictly
//! one at a time.
//!
//! # Wire format
//!
//! See [`wire`] module for the byte-level layout.

pub mod client;
pub mod error;
pub mod server;
pub mod wire;

#[cfg(test)]
mod testutil;

pub use client::{TcpDataClient, TransferReport};
pub use error::DataChannelError;
pub use server::{ReceiveReport, TcpDataServer, TransferOutcome};
pub use wire::{ChunkHeader, Metadata, Unit};

/// TCP read/write buffer size (64 KB).
pub const TCP_BUFFER_SIZE: usize = 64 * 1024;

/// Connections the OS queues while a session is being serviced.
pub const ACCEPT_BACKLOG: u32 = 8;
