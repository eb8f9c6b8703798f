//! Byte-weighted transfer progress.
//!
//! The copy primitive reports progress one file at a time. Tree transfers
//! remap those per-file reports onto a running aggregate so the caller sees
//! a single monotonic sequence for the whole walk.

use std::sync::mpsc::Sender;

use tracing::trace;

use crate::facade::FileTransferProgress;

/// Tracing target for progress reporting.
const PROGRESS_TARGET: &str = "kitlink::progress";

/// Snapshot of a transfer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferMetric {
    /// Bytes of the current file copied so far.
    pub file_bytes_transferred: u64,
    /// Size of the current file.
    pub file_total_bytes: u64,
    /// Bytes copied across the whole transfer, including the current file.
    pub total_bytes_transferred: u64,
    /// Size of the whole transfer; zero when it was not computed.
    pub total_bytes: u64,
}

/// Receiver of progress snapshots.
///
/// Called synchronously from the thread driving the transfer, possibly many
/// times per second. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    /// Handles one snapshot.
    fn on_progress(&self, metric: &TransferMetric);
}

impl<F> ProgressSink for F
where
    F: Fn(&TransferMetric) + Send + Sync,
{
    fn on_progress(&self, metric: &TransferMetric) {
        self(metric);
    }
}

impl ProgressSink for Sender<TransferMetric> {
    fn on_progress(&self, metric: &TransferMetric) {
        if self.send(*metric).is_err() {
            trace!(target: PROGRESS_TARGET, "progress receiver dropped");
        }
    }
}

#[derive(Debug)]
struct InFlight {
    file: String,
    transferred: u64,
    total: u64,
}

/// Folds per-file progress into whole-transfer progress.
///
/// When the reported file changes, the previous file is committed at its
/// full size. Reported aggregates never decrease.
pub struct ProgressAggregator<'a> {
    sink: Option<&'a dyn ProgressSink>,
    total_bytes: u64,
    committed: u64,
    files: usize,
    current: Option<InFlight>,
    last_reported: u64,
}

impl<'a> ProgressAggregator<'a> {
    /// Aggregates towards `total_bytes`, forwarding snapshots to `sink`.
    #[must_use]
    pub const fn new(sink: Option<&'a dyn ProgressSink>, total_bytes: u64) -> Self {
        Self {
            sink,
            total_bytes,
            committed: 0,
            files: 0,
            current: None,
            last_reported: 0,
        }
    }

    /// Records one per-file report.
    pub fn record(&mut self, progress: &FileTransferProgress) {
        let switched = self
            .current
            .as_ref()
            .is_some_and(|current| current.file != progress.file);
        if switched {
            self.finish_current();
        }
        let current = self.current.get_or_insert_with(|| InFlight {
            file: progress.file.clone(),
            transferred: 0,
            total: 0,
        });
        current.transferred = current.transferred.max(progress.bytes_transferred);
        current.total = progress.total_bytes;
        self.emit();
    }

    /// Marks the in-flight file, if any, as finished.
    ///
    /// When the file's last report fell short of its size, one more snapshot
    /// is sent so the sink ends on the committed total.
    pub fn commit(&mut self) {
        if let Some((transferred, total)) = self
            .finish_current()
            .filter(|_| self.committed > self.last_reported)
        {
            self.send(transferred, total);
        }
    }

    /// Commits the in-flight file, returning its final byte counts.
    fn finish_current(&mut self) -> Option<(u64, u64)> {
        let finished = self.current.take()?;
        let size = finished.total.max(finished.transferred);
        self.committed = self.committed.saturating_add(size);
        self.files += 1;
        Some((size, finished.total))
    }

    /// Files committed so far.
    #[must_use]
    pub const fn files(&self) -> usize {
        self.files
    }

    /// Bytes transferred so far, including the in-flight file.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        let in_flight = self.current.as_ref().map_or(0, |current| current.transferred);
        self.committed.saturating_add(in_flight)
    }

    fn emit(&mut self) {
        let (file_bytes_transferred, file_total_bytes) = self
            .current
            .as_ref()
            .map_or((0, 0), |current| (current.transferred, current.total));
        self.send(file_bytes_transferred, file_total_bytes);
    }

    fn send(&mut self, file_bytes_transferred: u64, file_total_bytes: u64) {
        let Some(sink) = self.sink else {
            return;
        };
        let aggregate = self.transferred().max(self.last_reported);
        self.last_reported = aggregate;
        sink.on_progress(&TransferMetric {
            file_bytes_transferred,
            file_total_bytes,
            total_bytes_transferred: aggregate,
            total_bytes: self.total_bytes.max(aggregate),
        });
    }
}
