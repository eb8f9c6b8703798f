//! Upload of host directory trees.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{TREE_TARGET, TransferSummary, TreeWalker};
use crate::error::DeviceError;
use crate::facade::{CopyRequest, DeviceFacade, RecursionLevel, codes};
use crate::path::RemotePath;
use crate::progress::{ProgressAggregator, ProgressSink};

/// A host entry below the upload root.
struct HostEntry {
    path: Utf8PathBuf,
    is_dir: bool,
    size: u64,
}

impl<F: DeviceFacade + ?Sized> TreeWalker<'_, F> {
    /// Uploads the host directory `source` into the remote directory
    /// `destination`, creating it if needed.
    ///
    /// Generations whose copy primitive honours the recursion level upload in
    /// a single call; others are walked one entry at a time. Without
    /// `recursive` only the files directly inside `source` are sent and no
    /// subdirectories are created, whichever path is taken.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::HostIo`] when the source cannot be read,
    /// [`DeviceError::NotADirectory`] when the destination is a file,
    /// [`DeviceError::Cancelled`] when cancelled, or the first classified
    /// fault. Entries already uploaded stay on the device.
    pub fn send_directory(
        &self,
        source: &Utf8Path,
        destination: &RemotePath,
        recursive: bool,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<TransferSummary, DeviceError> {
        let metadata = fs::metadata(source).map_err(|error| DeviceError::host_io(source, error))?;
        if !metadata.is_dir() {
            return Err(DeviceError::host_io(
                source,
                io::Error::new(io::ErrorKind::NotADirectory, "upload source is not a directory"),
            ));
        }
        let max_depth = if recursive { usize::MAX } else { 1 };
        let total = if sink.is_some() {
            host_entries(source, max_depth)?
                .iter()
                .filter(|entry| !entry.is_dir)
                .map(|entry| entry.size)
                .fold(0_u64, u64::saturating_add)
        } else {
            0
        };

        self.ensure_destination(destination)?;
        let mut aggregator = ProgressAggregator::new(sink, total);
        let mut summary = TransferSummary::default();

        if self.generation.honours_recursion_level() {
            self.checkpoint()?;
            let level = if recursive {
                RecursionLevel::Unbounded
            } else {
                RecursionLevel::ThisLevel
            };
            let request = CopyRequest::upload(source.to_owned(), destination.clone());
            self.copy(&request, level, &mut aggregator)?;
            summary.files = aggregator.files();
        } else {
            for entry in host_entries(source, max_depth)? {
                self.checkpoint()?;
                if entry.is_dir && !recursive {
                    continue;
                }
                let remote = remote_path_for(source, &entry.path, destination)?;
                if entry.is_dir {
                    if self.make_directory_if_missing(&remote)? {
                        summary.directories += 1;
                    }
                } else {
                    let request = CopyRequest::upload(entry.path, remote);
                    self.copy(&request, RecursionLevel::ThisLevel, &mut aggregator)?;
                    summary.files += 1;
                }
            }
        }

        summary.bytes = aggregator.transferred();
        info!(
            target: TREE_TARGET,
            %source,
            %destination,
            files = summary.files,
            bytes = summary.bytes,
            "directory sent"
        );
        Ok(summary)
    }

    fn ensure_destination(&self, destination: &RemotePath) -> Result<(), DeviceError> {
        match self.resolve_entry(destination)? {
            Some(entry) if entry.is_directory => Ok(()),
            Some(_) => Err(DeviceError::NotADirectory {
                path: destination.clone(),
            }),
            None => self.make_directory_if_missing(destination).map(|_| ()),
        }
    }

    /// Returns `true` when the directory did not exist before.
    fn make_directory_if_missing(&self, directory: &RemotePath) -> Result<bool, DeviceError> {
        match self
            .device
            .call(|facade, address| facade.make_directory(address, directory))
        {
            Ok(()) => {
                debug!(target: TREE_TARGET, %directory, "directory created");
                Ok(true)
            }
            Err(DeviceError::Native(fault)) if fault.code() == codes::ALREADY_EXISTS => Ok(false),
            Err(error) => Err(error),
        }
    }
}

/// Lists the entries below `root` in pre-order, directories before their
/// contents, siblings sorted by name.
fn host_entries(root: &Utf8Path, max_depth: usize) -> Result<Vec<HostEntry>, DeviceError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|error| {
            let path = error
                .path()
                .and_then(Utf8Path::from_path)
                .unwrap_or(root)
                .to_owned();
            DeviceError::host_io(path, io::Error::from(error))
        })?;
        let metadata = entry
            .metadata()
            .map_err(|error| DeviceError::host_io(root, io::Error::from(error)))?;
        let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(|path| {
            DeviceError::host_io(
                root,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("host path {} is not valid UTF-8", path.display()),
                ),
            )
        })?;
        entries.push(HostEntry {
            path,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        });
    }
    Ok(entries)
}

/// Maps a host path below `root` onto the matching remote path.
fn remote_path_for(
    root: &Utf8Path,
    path: &Utf8Path,
    destination: &RemotePath,
) -> Result<RemotePath, DeviceError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        DeviceError::host_io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "entry is outside the upload root"),
        )
    })?;
    let mut remote = destination.clone();
    for component in relative.components() {
        remote = remote.join(component.as_str())?;
    }
    Ok(remote)
}
