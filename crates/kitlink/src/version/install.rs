//! Discovery of the device kit installed on the controlling host.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use super::parse::KitVersion;
use crate::error::ResolveError;

/// Tracing target for installation discovery.
const INSTALL_TARGET: &str = "kitlink::version::install";

/// Directory under the kit root holding the transport binaries.
pub const BIN_DIR: &str = "bin";

/// Transport executable names, in lookup order.
pub const TRANSPORT_EXECUTABLES: &[&str] = &["kittransport.exe", "kittransport"];

/// Version stamp written next to the transport executable.
pub const VERSION_FILE: &str = "kit.version";

/// A located device-kit installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitInstallation {
    root: Utf8PathBuf,
    bin_dir: Utf8PathBuf,
    transport: Utf8PathBuf,
}

impl KitInstallation {
    /// Locates the installation under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InstallationNotFound`] when `root/bin` is not a
    /// directory and [`ResolveError::MissingTransport`] when it holds no
    /// transport executable.
    pub fn discover(root: &Utf8Path) -> Result<Self, ResolveError> {
        let bin_dir = root.join(BIN_DIR);
        if !bin_dir.is_dir() {
            return Err(ResolveError::InstallationNotFound { path: bin_dir });
        }
        let transport = TRANSPORT_EXECUTABLES
            .iter()
            .map(|name| bin_dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ResolveError::MissingTransport {
                bin_dir: bin_dir.clone(),
            })?;
        debug!(target: INSTALL_TARGET, %root, %transport, "device kit located");
        Ok(Self {
            root: root.to_owned(),
            bin_dir,
            transport,
        })
    }

    /// Kit root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding the transport binaries.
    #[must_use]
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin_dir
    }

    /// Transport executable.
    #[must_use]
    pub fn transport(&self) -> &Utf8Path {
        &self.transport
    }

    /// Path of the version stamp.
    #[must_use]
    pub fn version_file(&self) -> Utf8PathBuf {
        self.bin_dir.join(VERSION_FILE)
    }

    /// Reads and parses the first non-blank line of the version stamp.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::ReadVersion`] when the stamp cannot be read
    /// and [`ResolveError::MalformedVersion`] when it does not parse.
    pub fn read_version(&self) -> Result<KitVersion, ResolveError> {
        let path = self.version_file();
        let contents = fs::read_to_string(&path).map_err(|source| ResolveError::ReadVersion {
            path: path.clone(),
            source: Arc::new(source),
        })?;
        let line = contents
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default();
        line.parse()
            .map_err(|source| ResolveError::MalformedVersion { path, source })
    }
}
