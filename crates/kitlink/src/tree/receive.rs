//! Download of remote directory trees.

use std::fs;

use camino::Utf8Path;
use tracing::{debug, info};

use super::{TREE_TARGET, TransferSummary, TreeWalker};
use crate::error::DeviceError;
use crate::facade::{
    CopyRequest, DeviceFacade, FileTransferProgress, RecursionLevel, RemoteFileInfo,
};
use crate::path::RemotePath;
use crate::progress::{ProgressAggregator, ProgressSink};

impl<F: DeviceFacade + ?Sized> TreeWalker<'_, F> {
    /// Downloads the directory at `source` into the host directory
    /// `destination`, creating it if needed.
    ///
    /// The byte total is computed up front only when `sink` is supplied.
    /// Progress is reported as one monotonic sequence across the whole walk.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] or [`DeviceError::NotADirectory`]
    /// for a bad source, [`DeviceError::HostIo`] when the destination cannot
    /// be written, [`DeviceError::Cancelled`] when cancelled, or the first
    /// classified fault. Files already copied stay on the host.
    pub fn receive_directory(
        &self,
        source: &RemotePath,
        destination: &Utf8Path,
        recursive: bool,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<TransferSummary, DeviceError> {
        self.require_directory(source)?;
        fs::create_dir_all(destination)
            .map_err(|error| DeviceError::host_io(destination, error))?;

        let total = if sink.is_some() {
            self.total_size(source, recursive)?
        } else {
            0
        };
        let mut aggregator = ProgressAggregator::new(sink, total);
        let mut summary = TransferSummary::default();

        if !recursive && self.generation.honours_recursion_level() {
            self.checkpoint()?;
            let request = CopyRequest::download(source.clone(), destination.to_owned());
            self.copy(&request, RecursionLevel::ThisLevel, &mut aggregator)?;
            summary.files = aggregator.files();
        } else {
            self.receive_level(source, destination, recursive, &mut aggregator, &mut summary)?;
        }

        summary.bytes = aggregator.transferred();
        info!(
            target: TREE_TARGET,
            %source,
            %destination,
            files = summary.files,
            bytes = summary.bytes,
            "directory received"
        );
        Ok(summary)
    }

    fn receive_level(
        &self,
        directory: &RemotePath,
        destination: &Utf8Path,
        recursive: bool,
        aggregator: &mut ProgressAggregator<'_>,
        summary: &mut TransferSummary,
    ) -> Result<(), DeviceError> {
        self.checkpoint()?;
        let (subdirectories, files): (Vec<RemoteFileInfo>, Vec<RemoteFileInfo>) = self
            .list_children(directory, true)?
            .into_iter()
            .partition(|child| child.is_directory);

        for file in files {
            self.checkpoint()?;
            let target = destination.join(file.name());
            let request = CopyRequest::download(file.path, target);
            self.copy(&request, RecursionLevel::ThisLevel, aggregator)?;
            summary.files += 1;
        }

        if !recursive {
            return Ok(());
        }
        for subdirectory in subdirectories {
            self.checkpoint()?;
            let target = destination.join(subdirectory.name());
            fs::create_dir_all(&target).map_err(|error| DeviceError::host_io(&target, error))?;
            summary.directories += 1;
            debug!(target: TREE_TARGET, directory = %subdirectory.path, "descending");
            self.receive_level(&subdirectory.path, &target, true, aggregator, summary)?;
        }
        Ok(())
    }

    /// Sums the sizes of the files below `directory`.
    fn total_size(&self, directory: &RemotePath, recursive: bool) -> Result<u64, DeviceError> {
        let mut total = 0_u64;
        for child in self.list_children(directory, true)? {
            let size = if child.is_directory {
                if recursive {
                    self.total_size(&child.path, true)?
                } else {
                    0
                }
            } else {
                child.size
            };
            total = total.saturating_add(size);
        }
        Ok(total)
    }

    /// Runs one copy call, feeding its per-file progress into `aggregator`.
    pub(super) fn copy(
        &self,
        request: &CopyRequest,
        recursion: RecursionLevel,
        aggregator: &mut ProgressAggregator<'_>,
    ) -> Result<(), DeviceError> {
        let mut record = |progress: &FileTransferProgress| aggregator.record(progress);
        self.device
            .call(|facade, address| facade.copy_files(address, request, recursion, &mut record))?;
        aggregator.commit();
        Ok(())
    }
}
