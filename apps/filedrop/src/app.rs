//! `send` and `recv` commands.

use std::path::{Path, PathBuf};

use filedrop_data_channel::{TcpDataClient, TcpDataServer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::report;

const EVENT_BUFFER: usize = 256;
const OUTCOME_BUFFER: usize = 16;

/// Sends `file` to `host:port`. Fails on any transfer error.
pub async fn run_send(
    config: &Config,
    file: &Path,
    host: &str,
    port: u16,
    chunk_size: Option<usize>,
) -> anyhow::Result<()> {
    let client = TcpDataClient::new(chunk_size.unwrap_or(config.chunk_size))?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let reporter = tokio::spawn(report::log_events(event_rx, config.progress_interval()));

    let result = tokio::select! {
        result = client.send(file, host, port, event_tx) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    // The send future is gone, so the event channel is closed.
    let _ = reporter.await;

    match result {
        Some(Ok(sent)) => {
            info!(
                file = %sent.file_name,
                bytes = sent.bytes_sent,
                chunks = sent.chunks_sent,
                "file sent successfully"
            );
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => anyhow::bail!("transfer interrupted"),
    }
}

/// Receives files on `host:port` until Ctrl-C.
pub async fn run_recv(
    config: &Config,
    host: &str,
    port: u16,
    dest: Option<PathBuf>,
) -> anyhow::Result<()> {
    let dest = dest.unwrap_or_else(|| config.destination_dir.clone());
    let cancel = CancellationToken::new();
    let server = TcpDataServer::new(dest, cancel.clone());

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_BUFFER);
    let reporter = tokio::spawn(report::log_events(event_rx, config.progress_interval()));
    let tally = tokio::spawn(report::tally_outcomes(outcome_rx));

    let result = tokio::select! {
        result = server.listen(host, port, event_tx, outcome_tx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping receiver");
            cancel.cancel();
            Ok(())
        }
    };

    let _ = reporter.await;
    match tally.await {
        Ok(tally) => info!(
            completed = tally.completed,
            corrupted = tally.corrupted,
            aborted = tally.aborted,
            "receiver stopped"
        ),
        Err(e) => warn!(error = %e, "outcome tally task failed"),
    }

    result?;
    Ok(())
}
