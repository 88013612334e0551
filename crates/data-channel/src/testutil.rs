//! Loopback receiver harness and faulty transports shared by the tests.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use filedrop_transfer::TransferEvent;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DataChannelError;
use crate::server::{TcpDataServer, TransferOutcome};

/// Peer address used for in-memory sessions.
pub(crate) const TEST_PEER: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 40000));

const WAIT: Duration = Duration::from_secs(10);

pub(crate) struct TestServer {
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    pub events: mpsc::Receiver<TransferEvent>,
    pub outcomes: mpsc::Receiver<TransferOutcome>,
    pub handle: JoinHandle<Result<(), DataChannelError>>,
}

/// Starts a receiver on an ephemeral loopback port writing into `dest`.
pub(crate) async fn spawn_server(dest: &Path) -> TestServer {
    let cancel = CancellationToken::new();
    let server = TcpDataServer::new(dest.to_path_buf(), cancel.clone());
    let listener = TcpDataServer::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (event_tx, events) = mpsc::channel(1024);
    let (outcome_tx, outcomes) = mpsc::channel(16);
    let handle = tokio::spawn(async move { server.serve(listener, event_tx, outcome_tx).await });

    TestServer {
        addr,
        cancel,
        events,
        outcomes,
        handle,
    }
}

impl TestServer {
    pub async fn next_outcome(&mut self) -> TransferOutcome {
        tokio::time::timeout(WAIT, self.outcomes.recv())
            .await
            .expect("timed out waiting for a session outcome")
            .expect("server stopped")
    }

    /// Drains events until one matches `pred`.
    pub async fn wait_for_event(
        &mut self,
        pred: impl Fn(&TransferEvent) -> bool,
    ) -> TransferEvent {
        loop {
            let event = tokio::time::timeout(WAIT, self.events.recv())
                .await
                .expect("timed out waiting for an event")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    /// Drains every event currently buffered.
    pub fn drain_events(&mut self) -> Vec<TransferEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Yields `data`, then fails every read with `ConnectionReset`.
pub(crate) struct ResetAfter {
    data: Vec<u8>,
    pos: usize,
}

impl ResetAfter {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl AsyncRead for ResetAfter {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos >= this.data.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by peer",
            )));
        }
        let n = (this.data.len() - this.pos).min(buf.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Accepts `limit` bytes, then fails every write with `BrokenPipe`.
pub(crate) struct BrokenAfter {
    pub written: Vec<u8>,
    limit: usize,
}

impl BrokenAfter {
    pub fn new(limit: usize) -> Self {
        Self {
            written: Vec::new(),
            limit,
        }
    }
}

impl AsyncWrite for BrokenAfter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let room = this.limit - this.written.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed",
            )));
        }
        let n = room.min(buf.len());
        this.written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
