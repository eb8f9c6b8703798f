//! Bottom-up deletion of remote directories.

use tracing::{debug, info};

use super::{DeleteSummary, TREE_TARGET, TreeWalker};
use crate::error::DeviceError;
use crate::facade::{DeviceFacade, RemoteFileInfo};
use crate::path::RemotePath;

impl<F: DeviceFacade + ?Sized> TreeWalker<'_, F> {
    /// Deletes the directory at `root`.
    ///
    /// Files at each level go in one batched call, subdirectories are emptied
    /// depth-first when `recursive` is set, and each directory is removed
    /// once empty. Without `recursive`, a directory that still holds
    /// subdirectories fails to be removed with the device's own fault.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] or [`DeviceError::NotADirectory`]
    /// for a bad root, [`DeviceError::Cancelled`] when cancelled, or the first
    /// classified fault. Entries deleted before the failure stay deleted.
    pub fn delete_directory(
        &self,
        root: &RemotePath,
        recursive: bool,
    ) -> Result<DeleteSummary, DeviceError> {
        self.require_directory(root)?;
        let mut summary = DeleteSummary::default();
        self.delete_level(root, recursive, &mut summary)?;
        info!(
            target: TREE_TARGET,
            %root,
            files = summary.files_deleted,
            directories = summary.directories_removed,
            "directory deleted"
        );
        Ok(summary)
    }

    /// Deletes the single file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] when nothing exists at `path`, or
    /// the classified fault, which the device raises for directories.
    pub fn delete_file(&self, path: &RemotePath) -> Result<(), DeviceError> {
        if self.resolve_entry(path)?.is_none() {
            return Err(DeviceError::NotFound { path: path.clone() });
        }
        let files = [path.clone()];
        self.device
            .call(|facade, address| facade.delete_files(address, &files))
    }

    fn delete_level(
        &self,
        directory: &RemotePath,
        recursive: bool,
        summary: &mut DeleteSummary,
    ) -> Result<(), DeviceError> {
        self.checkpoint()?;
        let (subdirectories, files): (Vec<RemoteFileInfo>, Vec<RemoteFileInfo>) = self
            .list_children(directory, true)?
            .into_iter()
            .partition(|child| child.is_directory);

        if !files.is_empty() {
            let paths: Vec<RemotePath> = files.into_iter().map(|file| file.path).collect();
            self.device
                .call(|facade, address| facade.delete_files(address, &paths))?;
            summary.files_deleted += paths.len();
            debug!(target: TREE_TARGET, %directory, count = paths.len(), "files deleted");
        }

        if recursive {
            for subdirectory in &subdirectories {
                self.delete_level(&subdirectory.path, true, summary)?;
            }
        }

        self.checkpoint()?;
        self.device
            .call(|facade, address| facade.remove_directory(address, directory))?;
        summary.directories_removed += 1;
        debug!(target: TREE_TARGET, %directory, "directory removed");
        Ok(())
    }
}
