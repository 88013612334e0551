//! Console reporting of transfer progress and receiver outcomes.

use std::time::{Duration, Instant};

use filedrop_data_channel::TransferOutcome;
use filedrop_transfer::{SpeedCalculator, TransferEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Logs progress events until the channel closes.
///
/// Chunk progress is throttled to one line per `interval`; the final chunk
/// of a transfer is always logged.
pub async fn log_events(mut events: mpsc::Receiver<TransferEvent>, interval: Duration) {
    let speed = SpeedCalculator::new(None, None);
    let mut last_bytes = 0u64;
    let mut last_log: Option<Instant> = None;

    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Started {
                file_name,
                total_bytes,
            } => {
                speed.reset();
                last_bytes = 0;
                last_log = None;
                info!(file = %file_name, size = total_bytes, "transfer started");
            }
            TransferEvent::Chunk(progress) => {
                speed.add_sample(progress.bytes_done.saturating_sub(last_bytes));
                last_bytes = progress.bytes_done;

                let due = last_log.is_none_or(|at| at.elapsed() >= interval);
                if due || progress.is_complete() {
                    last_log = Some(Instant::now());
                    let eta = speed.eta(progress.total_bytes.saturating_sub(progress.bytes_done));
                    info!(
                        chunk = progress.chunk_index + 1,
                        bytes = progress.bytes_done,
                        total = progress.total_bytes,
                        percent = %format!("{:.1}", progress.percent()),
                        rate = %format_rate(speed.bytes_per_second()),
                        eta_secs = eta.map(|d| d.as_secs()),
                        "progress"
                    );
                }
            }
            TransferEvent::ChecksumMismatch { chunk_index, .. } => {
                debug!(chunk = chunk_index, "chunk flagged as corrupted");
            }
            TransferEvent::Finished { bytes, chunks } => {
                info!(bytes, chunks, "transfer finished");
            }
        }
    }
}

/// Renders a byte rate with a binary unit, e.g. `1.5 MiB/s`.
pub fn format_rate(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} B/s")
    } else {
        format!("{value:.1} {}/s", UNITS[unit])
    }
}

/// Session counts over a receiver's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionTally {
    pub completed: u64,
    /// Completed sessions with at least one mismatched chunk.
    pub corrupted: u64,
    pub aborted: u64,
}

impl SessionTally {
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Completed(report) => {
                self.completed += 1;
                if !report.mismatched_chunks.is_empty() {
                    self.corrupted += 1;
                }
            }
            TransferOutcome::Aborted { .. } => self.aborted += 1,
        }
    }
}

/// Counts outcomes until the channel closes.
pub async fn tally_outcomes(mut outcomes: mpsc::Receiver<TransferOutcome>) -> SessionTally {
    let mut tally = SessionTally::default();
    while let Some(outcome) = outcomes.recv().await {
        tally.record(&outcome);
    }
    tally
}
