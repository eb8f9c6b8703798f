//! Conversion of layered configuration into core runtime types.

use std::time::Duration;

use kitlink_config::Config;

use crate::budget::TimeoutBudget;
use crate::liveness::LivenessSettings;
use crate::retry::RetryPolicy;

/// Timing parameters used by a [`Console`](super::Console).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Polling cadence of every bounded wait.
    pub retry_policy: RetryPolicy,
    /// Parameters of the network-layer reachability probe.
    pub liveness: LivenessSettings,
    /// Budget used by [`Console::reboot_with_default_budget`](super::Console::reboot_with_default_budget).
    pub reboot_budget: TimeoutBudget,
    /// Budget used by [`Console::shutdown_with_default_budget`](super::Console::shutdown_with_default_budget).
    pub shutdown_budget: TimeoutBudget,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RuntimeSettings {
    /// Resolves `config` through its defaulting accessors.
    ///
    /// Negative reboot or shutdown timeouts become infinite budgets.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry_policy: RetryPolicy::new(Duration::from_millis(config.poll_interval_ms())),
            liveness: LivenessSettings {
                ping_port: config.ping_port(),
                ping_timeout: Duration::from_millis(config.ping_timeout_ms()),
            },
            reboot_budget: TimeoutBudget::from_millis(config.reboot_timeout_ms()),
            shutdown_budget: TimeoutBudget::from_millis(config.shutdown_timeout_ms()),
        }
    }
}
