//! Layered configuration for kitlink.
//!
//! Values are merged by `ortho_config` from, in rising precedence, built-in
//! defaults, a TOML file named with `--config-path`, `KITLINK_*` environment
//! variables and command-line flags. Every field is optional; the accessors
//! on [`Config`] apply the defaults from [`defaults`] so callers never deal
//! with partially populated values.
//!
//! Timeouts are expressed in milliseconds. A negative reboot or shutdown
//! timeout means "wait forever", matching the behaviour of the retry
//! scheduler in the core crate.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PING_PORT, DEFAULT_PING_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REBOOT_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS, default_kit_root, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by kitlink sessions and telemetry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KITLINK_")]
pub struct Config {
    /// `tracing` filter expression, for example `kitlink=debug`.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Installation root of the device kit on the controlling host.
    pub kit_root: Option<Utf8PathBuf>,
    /// Overall reboot budget in milliseconds; negative waits forever.
    pub reboot_timeout_ms: Option<i64>,
    /// Shutdown budget in milliseconds; negative waits forever.
    pub shutdown_timeout_ms: Option<i64>,
    /// Maximum delay between liveness polls in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Timeout of one network reachability probe in milliseconds.
    pub ping_timeout_ms: Option<u64>,
    /// TCP port probed to decide network-layer reachability.
    pub ping_port: Option<u16>,
}

impl Config {
    /// Loads configuration from the given argument iterator, the process
    /// environment and any configuration file it names.
    ///
    /// # Errors
    ///
    /// Returns the aggregated `ortho_config` error when a source is malformed.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }

    /// Device kit installation root.
    #[must_use]
    pub fn kit_root(&self) -> Utf8PathBuf {
        self.kit_root.clone().unwrap_or_else(default_kit_root)
    }

    /// Reboot budget in milliseconds.
    #[must_use]
    pub fn reboot_timeout_ms(&self) -> i64 {
        self.reboot_timeout_ms.unwrap_or(DEFAULT_REBOOT_TIMEOUT_MS)
    }

    /// Shutdown budget in milliseconds.
    #[must_use]
    pub fn shutdown_timeout_ms(&self) -> i64 {
        self.shutdown_timeout_ms.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS)
    }

    /// Maximum delay between liveness polls in milliseconds.
    #[must_use]
    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }

    /// Network probe timeout in milliseconds.
    #[must_use]
    pub fn ping_timeout_ms(&self) -> u64 {
        self.ping_timeout_ms.unwrap_or(DEFAULT_PING_TIMEOUT_MS)
    }

    /// TCP port used for the network probe.
    #[must_use]
    pub fn ping_port(&self) -> u16 {
        self.ping_port.unwrap_or(DEFAULT_PING_PORT)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn accessors_apply_defaults() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.reboot_timeout_ms(), DEFAULT_REBOOT_TIMEOUT_MS);
        assert_eq!(config.shutdown_timeout_ms(), DEFAULT_SHUTDOWN_TIMEOUT_MS);
        assert_eq!(config.poll_interval_ms(), DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.ping_port(), DEFAULT_PING_PORT);
        assert!(config.kit_root().ends_with("devkit"));
    }

    #[test]
    fn explicit_values_win_over_defaults() {
        let config = Config {
            log_filter: Some(String::from("kitlink=trace")),
            reboot_timeout_ms: Some(-1),
            kit_root: Some(Utf8PathBuf::from("/opt/kit")),
            ..Config::default()
        };
        assert_eq!(config.log_filter(), "kitlink=trace");
        assert_eq!(config.reboot_timeout_ms(), -1);
        assert_eq!(config.kit_root(), Utf8PathBuf::from("/opt/kit"));
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
        let parsed: LogFormat = text.parse().expect("valid log format");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn log_format_rejects_unknown_values() {
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
