//! Recursive operations over the remote file namespace.
//!
//! The remote primitives are not reliably recursive on every kit generation,
//! so each tree operation is decomposed into single-level calls:
//! - `resolve` tells files from directories through wildcard searches.
//! - `delete` empties directories bottom-up before removing them.
//! - `receive` downloads a tree depth-first with aggregated progress.
//! - `send` uploads a host tree, one level at a time when required.
//!
//! A partially completed walk is not rolled back.

mod delete;
mod receive;
mod resolve;
mod send;


use crate::error::DeviceError;
use crate::facade::DeviceFacade;
use crate::fault::Guarded;
use crate::transfer::CancellationToken;
use crate::version::KitGeneration;

/// Tracing target for tree walks.
const TREE_TARGET: &str = "kitlink::tree";

/// Outcome of a delete walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Files removed.
    pub files_deleted: usize,
    /// Directories removed, including the root of the walk.
    pub directories_removed: usize,
}

/// Outcome of a send or receive walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Files copied.
    pub files: usize,
    /// Directories created at the destination, excluding the root.
    pub directories: usize,
    /// Bytes copied.
    pub bytes: u64,
}

/// Walks remote trees through a guarded facade.
pub struct TreeWalker<'a, F: ?Sized> {
    device: Guarded<'a, F>,
    generation: KitGeneration,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, F: DeviceFacade + ?Sized> TreeWalker<'a, F> {
    /// Walks through `device` using the capabilities of `generation`.
    #[must_use]
    pub const fn new(device: Guarded<'a, F>, generation: KitGeneration) -> Self {
        Self {
            device,
            generation,
            cancel: None,
        }
    }

    /// Stops the walk between file units once `token` is cancelled.
    #[must_use]
    pub const fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn checkpoint(&self) -> Result<(), DeviceError> {
        self.cancel.map_or(Ok(()), CancellationToken::checkpoint)
    }
}
