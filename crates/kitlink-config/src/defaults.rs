use camino::Utf8PathBuf;
use std::env;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Overall reboot budget used when none is configured.
pub const DEFAULT_REBOOT_TIMEOUT_MS: i64 = 300_000;

/// Shutdown budget used when none is configured.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: i64 = 120_000;

/// Upper bound on the delay between two liveness polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Timeout applied to a single network-layer reachability probe.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1_000;

/// TCP port answered by the device's transport service.
pub const DEFAULT_PING_PORT: u16 = 11_442;

/// Directory name of the device kit below the platform data directory.
const KIT_DIRECTORY: &str = "devkit";

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default installation root of the device kit.
///
/// Uses the platform data directory when it is representable as UTF-8 and
/// falls back to the temporary directory otherwise.
#[must_use]
pub fn default_kit_root() -> Utf8PathBuf {
    let base = dirs::data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join(KIT_DIRECTORY)
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
