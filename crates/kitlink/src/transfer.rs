//! Background execution of long-running tree transfers.
//!
//! A transfer runs on a dedicated worker thread and observes a shared
//! cancellation flag between file units. Cancellation is cooperative: a file
//! already being copied finishes, and whatever was transferred before the
//! flag was seen stays in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::debug;

use crate::error::DeviceError;

/// Tracing target for background transfers.
const TRANSFER_TARGET: &str = "kitlink::transfer";

/// Shared flag asking a running transfer to stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`CancellationToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`DeviceError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Cancelled`] when the token has been cancelled.
    pub fn checkpoint(&self) -> Result<(), DeviceError> {
        if self.is_cancelled() {
            debug!(target: TRANSFER_TARGET, "cancellation observed");
            return Err(DeviceError::Cancelled);
        }
        Ok(())
    }
}

/// Handle to a transfer running on a worker thread.
#[derive(Debug)]
pub struct TransferHandle<T> {
    token: CancellationToken,
    worker: thread::JoinHandle<Result<T, DeviceError>>,
}

impl<T: Send + 'static> TransferHandle<T> {
    /// Runs `work` on a named worker thread with a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::SpawnWorker`] when the thread cannot be started.
    pub(crate) fn spawn<W>(name: &str, work: W) -> Result<Self, DeviceError>
    where
        W: FnOnce(&CancellationToken) -> Result<T, DeviceError> + Send + 'static,
    {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let worker = thread::Builder::new()
            .name(format!("kitlink-{name}"))
            .spawn(move || work(&worker_token))
            .map_err(|source| DeviceError::SpawnWorker {
                source: Arc::new(source),
            })?;
        debug!(target: TRANSFER_TARGET, name, "transfer worker started");
        Ok(Self { token, worker })
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token observed by the worker.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once the worker has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the worker and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the transfer's own error, [`DeviceError::Cancelled`] when the
    /// walk stopped early, or [`DeviceError::WorkerPanicked`].
    pub fn join(self) -> Result<T, DeviceError> {
        self.worker
            .join()
            .map_err(|_| DeviceError::WorkerPanicked)?
    }
}
