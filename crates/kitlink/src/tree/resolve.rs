//! Existence and kind of remote entries.
//!
//! No stat primitive exists below a volume root, so an entry is resolved by
//! searching its parent for `name*` and picking the exact, case-insensitive
//! match among the results.

use tracing::debug;

use super::{TREE_TARGET, TreeWalker};
use crate::error::DeviceError;
use crate::facade::{DeviceFacade, RecursionLevel, RemoteFileInfo, SearchPattern};
use crate::path::RemotePath;

impl<F: DeviceFacade + ?Sized> TreeWalker<'_, F> {
    /// Looks `path` up on the device.
    ///
    /// Returns `None` when the entry does not exist. A root resolves to a
    /// directory when its listing succeeds.
    ///
    /// # Errors
    ///
    /// Returns classified faults other than "not found".
    pub fn resolve_entry(&self, path: &RemotePath) -> Result<Option<RemoteFileInfo>, DeviceError> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return self.resolve_root(path);
        };
        let pattern = SearchPattern::new(parent, format!("{name}*"));
        let candidates = match self.search(&pattern) {
            Ok(candidates) => candidates,
            Err(DeviceError::Native(fault)) if fault.is_not_found() => return Ok(None),
            Err(error) => return Err(error),
        };
        Ok(candidates
            .into_iter()
            .find(|candidate| candidate.name().eq_ignore_ascii_case(name)))
    }

    /// Returns `true` when `path` names an existing file.
    ///
    /// # Errors
    ///
    /// Returns classified faults other than "not found".
    pub fn file_exists(&self, path: &RemotePath) -> Result<bool, DeviceError> {
        Ok(self
            .resolve_entry(path)?
            .is_some_and(|entry| !entry.is_directory))
    }

    /// Returns `true` when `path` names an existing directory.
    ///
    /// # Errors
    ///
    /// Returns classified faults other than "not found".
    pub fn directory_exists(&self, path: &RemotePath) -> Result<bool, DeviceError> {
        Ok(self
            .resolve_entry(path)?
            .is_some_and(|entry| entry.is_directory))
    }

    /// Lists the direct children of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] or [`DeviceError::NotADirectory`]
    /// when `path` is not a directory, or the classified listing fault.
    pub fn list_directory(&self, path: &RemotePath) -> Result<Vec<RemoteFileInfo>, DeviceError> {
        self.require_directory(path)?;
        self.list_children(path, true)
    }

    /// Resolves `path` and fails unless it is a directory.
    pub(super) fn require_directory(&self, path: &RemotePath) -> Result<(), DeviceError> {
        match self.resolve_entry(path)? {
            Some(entry) if entry.is_directory => Ok(()),
            Some(_) => Err(DeviceError::NotADirectory { path: path.clone() }),
            None => Err(DeviceError::NotFound { path: path.clone() }),
        }
    }

    /// Lists the direct children of `directory`.
    ///
    /// Some kit generations report "not found" when listing an empty
    /// directory. When the caller already knows the directory exists, that
    /// fault means "no children"; otherwise it propagates.
    pub(super) fn list_children(
        &self,
        directory: &RemotePath,
        known_to_exist: bool,
    ) -> Result<Vec<RemoteFileInfo>, DeviceError> {
        match self.search(&SearchPattern::children_of(directory.clone())) {
            Ok(children) => Ok(children
                .into_iter()
                .filter(|child| !child.path.same_entry(directory))
                .collect()),
            Err(DeviceError::Native(fault)) if known_to_exist && fault.is_not_found() => {
                debug!(
                    target: TREE_TARGET,
                    %directory,
                    code = fault.code(),
                    "listing of existing directory reported not found; treating as empty"
                );
                Ok(Vec::new())
            }
            Err(error) => Err(error),
        }
    }

    /// Volume roots are stat-able by listing them. A "not found" fault means
    /// the volume is absent: the generations that fail empty listings
    /// spuriously do so only below a volume root, never for the root itself.
    fn resolve_root(&self, root: &RemotePath) -> Result<Option<RemoteFileInfo>, DeviceError> {
        match self.search(&SearchPattern::children_of(root.clone())) {
            Ok(_) => Ok(Some(RemoteFileInfo {
                path: root.clone(),
                size: 0,
                is_directory: true,
            })),
            Err(DeviceError::Native(fault)) if fault.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn search(&self, pattern: &SearchPattern) -> Result<Vec<RemoteFileInfo>, DeviceError> {
        self.device
            .call(|facade, address| facade.find_files(address, pattern, RecursionLevel::ThisLevel))
    }
}
