//! The call boundary to the vendor's native remote-control transport.
//!
//! [`DeviceFacade`] captures the primitives the transport offers. Each call
//! is a single remote round trip and either completes or raises a
//! [`NativeFault`]. Nothing above this trait ever sees transport-specific
//! types: the version resolver picks the concrete implementation once per
//! process and the rest of the crate talks to it through this interface.

use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::address::DeviceAddress;
use crate::path::{OperatingTarget, RemotePath};

/// Native status codes the crate interprets.
pub mod codes {
    /// The file named in the call does not exist.
    pub const FILE_NOT_FOUND: u32 = 0x8007_0002;
    /// The directory named in the call does not exist.
    pub const PATH_NOT_FOUND: u32 = 0x8007_0003;
    /// The directory still has entries.
    pub const DIRECTORY_NOT_EMPTY: u32 = 0x8007_0091;
    /// The entry already exists.
    pub const ALREADY_EXISTS: u32 = 0x8007_00B7;
    /// The device has begun shutting down.
    pub const SHUTDOWN_IN_PROGRESS: u32 = 0x8007_045B;
    /// The device-side RPC endpoint is gone.
    pub const RPC_SERVER_UNAVAILABLE: u32 = 0x8007_06BA;
    /// Unspecified failure.
    pub const GENERIC_FAILURE: u32 = 0x8000_4005;
}

/// A fault raised by the native transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("native call failed with 0x{code:08X}: {message}")]
pub struct NativeFault {
    code: u32,
    message: String,
}

impl NativeFault {
    /// Builds a fault from a status code and message.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status code reported by the transport.
    #[must_use]
    pub const fn code(&self) -> u32 {
        self.code
    }

    /// Message reported by the transport.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` when the fault reports a missing file or directory.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.code, codes::FILE_NOT_FOUND | codes::PATH_NOT_FOUND)
    }
}

/// Result of a single facade call.
pub type NativeResult<T> = Result<T, NativeFault>;

/// How deep a search or copy descends below its starting directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionLevel {
    /// Only the named directory.
    ThisLevel,
    /// The whole subtree.
    Unbounded,
}

impl RecursionLevel {
    /// Value passed on the wire: `0` for this level, `-1` for unbounded.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::ThisLevel => 0,
            Self::Unbounded => -1,
        }
    }
}

/// A process running on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Device-assigned process identifier.
    pub process_id: u32,
    /// Executable image name, for example `Home.exe`.
    pub image_name: String,
}

/// One entry returned by a remote search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    /// Full path of the entry.
    pub path: RemotePath,
    /// Size in bytes; zero for directories.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl RemoteFileInfo {
    /// Final path component of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or_else(|| self.path.as_str())
    }
}

/// A wildcard search rooted at a remote directory.
///
/// `*` matches any run of characters and `?` a single character. Matching is
/// ASCII case-insensitive, as on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPattern {
    directory: RemotePath,
    name_pattern: String,
}

impl SearchPattern {
    /// Searches `directory` for entries whose name matches `name_pattern`.
    #[must_use]
    pub fn new(directory: RemotePath, name_pattern: impl Into<String>) -> Self {
        Self {
            directory,
            name_pattern: name_pattern.into(),
        }
    }

    /// Matches every entry of `directory`.
    #[must_use]
    pub fn children_of(directory: RemotePath) -> Self {
        Self::new(directory, "*")
    }

    /// Directory being searched.
    #[must_use]
    pub const fn directory(&self) -> &RemotePath {
        &self.directory
    }

    /// Name pattern applied to each entry.
    #[must_use]
    pub fn name_pattern(&self) -> &str {
        &self.name_pattern
    }

    /// Returns `true` when `name` satisfies the pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let pattern: Vec<char> = self.name_pattern.to_ascii_lowercase().chars().collect();
        let candidate: Vec<char> = name.to_ascii_lowercase().chars().collect();
        wildcard_match(&pattern, &candidate)
    }
}

impl fmt::Display for SearchPattern {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.directory.is_root() {
            write!(formatter, "{}{}", self.directory, self.name_pattern)
        } else {
            write!(formatter, "{}\\{}", self.directory, self.name_pattern)
        }
    }
}

fn wildcard_match(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some(('*', rest)) => (0..=candidate.len())
            .any(|skip| wildcard_match(rest, candidate.get(skip..).unwrap_or_default())),
        Some((expected, rest)) => match candidate.split_first() {
            Some((actual, tail)) if *expected == '?' || expected == actual => {
                wildcard_match(rest, tail)
            }
            _ => false,
        },
    }
}

/// One side of a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyLocation {
    /// A file or directory on the controlling host.
    Host(Utf8PathBuf),
    /// A file or directory on the device.
    Device(RemotePath),
}

impl fmt::Display for CopyLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(path) => write!(formatter, "host:{path}"),
            Self::Device(path) => write!(formatter, "device:{path}"),
        }
    }
}

/// Source and destination of a copy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Entry being copied.
    pub source: CopyLocation,
    /// Where the copy lands.
    pub destination: CopyLocation,
}

impl CopyRequest {
    /// Upload from host to device.
    #[must_use]
    pub const fn upload(source: Utf8PathBuf, destination: RemotePath) -> Self {
        Self {
            source: CopyLocation::Host(source),
            destination: CopyLocation::Device(destination),
        }
    }

    /// Download from device to host.
    #[must_use]
    pub const fn download(source: RemotePath, destination: Utf8PathBuf) -> Self {
        Self {
            source: CopyLocation::Device(source),
            destination: CopyLocation::Host(destination),
        }
    }
}

/// Per-file progress reported by the copy primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferProgress {
    /// Identifies the file being copied; changes when the next file starts.
    pub file: String,
    /// Bytes of this file copied so far.
    pub bytes_transferred: u64,
    /// Size of this file.
    pub total_bytes: u64,
}

/// Native remote-control primitives.
///
/// Implementations must be shareable across threads: background transfers
/// drive the facade from a worker thread while the caller keeps a handle.
pub trait DeviceFacade: Send + Sync {
    /// Requests a reboot. Returns once the device accepted the command.
    fn reboot(&self, address: &DeviceAddress) -> NativeResult<()>;

    /// Requests a shutdown. Returns once the device accepted the command.
    fn shutdown(&self, address: &DeviceAddress) -> NativeResult<()>;

    /// Attempts a protocol-level connection.
    fn can_connect(&self, address: &DeviceAddress) -> NativeResult<bool>;

    /// Lists processes running in the given partition.
    fn running_processes(
        &self,
        address: &DeviceAddress,
        target: OperatingTarget,
    ) -> NativeResult<Vec<ProcessInfo>>;

    /// Searches for entries matching `pattern`.
    fn find_files(
        &self,
        address: &DeviceAddress,
        pattern: &SearchPattern,
        recursion: RecursionLevel,
    ) -> NativeResult<Vec<RemoteFileInfo>>;

    /// Copies a file or directory, reporting per-file progress.
    ///
    /// Generations that do not honour `recursion` copy only the named level.
    fn copy_files(
        &self,
        address: &DeviceAddress,
        request: &CopyRequest,
        recursion: RecursionLevel,
        progress: &mut dyn FnMut(&FileTransferProgress),
    ) -> NativeResult<()>;

    /// Deletes files in one batched call. Directories are rejected.
    fn delete_files(&self, address: &DeviceAddress, files: &[RemotePath]) -> NativeResult<()>;

    /// Removes an empty directory.
    fn remove_directory(&self, address: &DeviceAddress, directory: &RemotePath)
    -> NativeResult<()>;

    /// Creates a directory whose parent exists.
    fn make_directory(&self, address: &DeviceAddress, directory: &RemotePath) -> NativeResult<()>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn pattern(name: &str) -> SearchPattern {
        let dir = RemotePath::new("XD:\\games", OperatingTarget::Title).expect("valid");
        SearchPattern::new(dir, name)
    }

    #[rstest]
    #[case("*", "anything", true)]
    #[case("save*", "SAVE.dat", true)]
    #[case("save*", "autosave", false)]
    #[case("s?ve.dat", "save.dat", true)]
    #[case("*.dat", "save.bin", false)]
    #[case("save.dat", "save.dat", true)]
    fn wildcard_patterns(#[case] name_pattern: &str, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(pattern(name_pattern).matches(name), expected);
    }

    #[test]
    fn recursion_levels_map_to_wire_values() {
        assert_eq!(RecursionLevel::ThisLevel.raw(), 0);
        assert_eq!(RecursionLevel::Unbounded.raw(), -1);
    }

    #[test]
    fn not_found_codes_are_recognised() {
        assert!(NativeFault::new(codes::PATH_NOT_FOUND, "missing").is_not_found());
        assert!(NativeFault::new(codes::FILE_NOT_FOUND, "missing").is_not_found());
        assert!(!NativeFault::new(codes::GENERIC_FAILURE, "boom").is_not_found());
    }

    #[test]
    fn fault_display_includes_hex_code() {
        let fault = NativeFault::new(codes::SHUTDOWN_IN_PROGRESS, "shutting down");
        assert_eq!(
            fault.to_string(),
            "native call failed with 0x8007045B: shutting down"
        );
    }
}
