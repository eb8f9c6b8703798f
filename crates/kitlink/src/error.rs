//! Errors surfaced by device operations and implementation selection.
//!
//! Every operation degrades to one of a few outcomes: a [`Timeout`], a
//! reboot-correlated [`CannotConnect`], a passthrough [`Native`] fault, or one
//! of the crate's own validation failures. I/O errors are wrapped in `Arc` so
//! the enum stays small and cloneable.
//!
//! [`Timeout`]: DeviceError::Timeout
//! [`CannotConnect`]: DeviceError::CannotConnect
//! [`Native`]: DeviceError::Native

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::address::DeviceAddress;
use crate::budget::TimeoutBudget;
use crate::facade::NativeFault;
use crate::lifecycle::{LifecycleOperation, TimeoutReason};
use crate::path::{PathError, RemotePath};
use crate::version::{BuildKey, VersionParseError};

/// Errors raised by lifecycle and file-tree operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// A bounded wait did not reach its target state in time.
    #[error("{operation} of {address} {reason} within {budget}")]
    Timeout {
        /// Operation that was waiting.
        operation: LifecycleOperation,
        /// Address being observed when the budget ran out.
        address: DeviceAddress,
        /// State the device failed to reach.
        reason: TimeoutReason,
        /// Budget the wait was given.
        budget: TimeoutBudget,
    },

    /// The device is mid-reboot and refused the connection.
    #[error("cannot connect to {address}: the device is rebooting")]
    CannotConnect {
        /// Address that refused the call.
        address: DeviceAddress,
    },

    /// A native fault that is not a reboot artefact.
    #[error(transparent)]
    Native(#[from] NativeFault),

    /// The remote entry does not exist.
    #[error("remote entry {path} does not exist")]
    NotFound {
        /// Missing entry.
        path: RemotePath,
    },

    /// A directory operation named a file.
    #[error("remote entry {path} is not a directory")]
    NotADirectory {
        /// Offending entry.
        path: RemotePath,
    },

    /// A remote path could not be built.
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// Reading or writing the host side of a transfer failed.
    #[error("host I/O failed for {path}: {source}")]
    HostIo {
        /// Host path involved.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The caller cancelled a background transfer.
    #[error("transfer cancelled")]
    Cancelled,

    /// The background transfer worker could not be started.
    #[error("failed to start transfer worker: {source}")]
    SpawnWorker {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The background transfer worker panicked.
    #[error("transfer worker panicked")]
    WorkerPanicked,
}

impl DeviceError {
    /// Wraps a host-side I/O error.
    pub(crate) fn host_io(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::HostIo {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` for faults a polling loop should treat as "not ready
    /// yet" rather than as a failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::CannotConnect { .. } | Self::Native(_))
    }
}

/// Configuration faults raised while selecting the kit implementation.
///
/// None of these are retried: a missing or unrecognised installation stays
/// broken until the host is reconfigured.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The kit root or its binary directory does not exist.
    #[error("no device-kit installation found at {path}")]
    InstallationNotFound {
        /// Directory that was probed.
        path: Utf8PathBuf,
    },

    /// The binary directory has no transport executable.
    #[error("device-kit binary directory {bin_dir} has no transport executable")]
    MissingTransport {
        /// Directory that was searched.
        bin_dir: Utf8PathBuf,
    },

    /// The version file could not be read.
    #[error("failed to read device-kit version from {path}: {source}")]
    ReadVersion {
        /// Version file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The version file does not hold a valid version string.
    #[error("device-kit version in {path} is malformed: {source}")]
    MalformedVersion {
        /// Version file path.
        path: Utf8PathBuf,
        /// Parse failure.
        #[source]
        source: VersionParseError,
    },

    /// The version maps to a known build that has no implementation.
    #[error("device-kit build {build} ({version}) has no registered implementation")]
    UnregisteredBuild {
        /// Build key derived from the version.
        build: BuildKey,
        /// Version that produced the key.
        version: String,
    },
}
