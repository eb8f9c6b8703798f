//! Structured logging for processes that drive devices.
//!
//! The configured filter is read relative to kitlink: a bare level such as
//! `debug` raises the `kitlink` targets only, while dependencies stay at
//! `warn`. Full directives (`kitlink::lifecycle=trace`, `socket2=debug`) are
//! passed through untouched. Worker thread names are logged so background
//! transfers can be told apart from the calling thread.

use std::io::{self, IsTerminal};
use std::str::FromStr;

use kitlink_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Root of every tracing target emitted by this crate.
pub const LIBRARY_TARGET: &str = "kitlink";

/// Level applied to targets outside this crate.
const DEPENDENCY_LEVEL: &str = "warn";

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber already owns the process.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Expands the configured filter into `EnvFilter` directives.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when a bare directive is not a level.
///
/// # Examples
///
/// ```rust
/// use kitlink_config::Config;
/// use kitlink::telemetry::filter_directives;
///
/// # fn main() -> Result<(), kitlink::telemetry::TelemetryError> {
/// let config = Config {
///     log_filter: Some(String::from("debug,kitlink::tree=trace")),
///     ..Config::default()
/// };
/// assert_eq!(
///     filter_directives(&config)?,
///     "warn,kitlink=debug,kitlink::tree=trace"
/// );
/// # Ok(())
/// # }
/// ```
pub fn filter_directives(config: &Config) -> Result<String, TelemetryError> {
    let mut directives = vec![String::from(DEPENDENCY_LEVEL)];
    for directive in config
        .log_filter()
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
    {
        if directive.contains(['=', '[', ':']) {
            directives.push(String::from(directive));
            continue;
        }
        LevelFilter::from_str(directive).map_err(|_| {
            TelemetryError::Filter(format!("{directive:?} is neither a level nor a directive"))
        })?;
        directives.push(format!(
            "{LIBRARY_TARGET}={}",
            directive.to_ascii_lowercase()
        ));
    }
    Ok(directives.join(","))
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// global state, whatever configuration they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when some other subscriber already owns
/// the process.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn build_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    let directives = filter_directives(config)?;
    EnvFilter::try_new(&directives).map_err(|error| TelemetryError::Filter(error.to_string()))
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let stderr_is_terminal = io::stderr().is_terminal();

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_thread_names(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(stderr_is_terminal)
                .with_thread_names(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .compact()
                .finish(),
        ),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
