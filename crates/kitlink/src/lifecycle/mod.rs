//! Reboot and shutdown sequencing.
//!
//! There is no native "wait until rebooted" primitive, so completion is
//! inferred from behaviour. After the command is accepted the orchestrator
//! waits for the device to stop responding, then (for a reboot) waits for a
//! home or setup shell process to appear. One overall [`TimeoutBudget`] is
//! shared by both waits: whatever the first wait spends is unavailable to the
//! second.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::address::DeviceAddress;
use crate::budget::TimeoutBudget;
use crate::clock::{Clock, Stopwatch};
use crate::error::DeviceError;
use crate::facade::ProcessInfo;
use crate::path::OperatingTarget;
use crate::retry::{RetryPolicy, retry_until};

/// Tracing target for lifecycle orchestration.
const LIFECYCLE_TARGET: &str = "kitlink::lifecycle";

/// Power operation being orchestrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOperation {
    /// Restart the device and wait for it to come back.
    Reboot,
    /// Power the device off.
    Shutdown,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
        })
    }
}

/// State a timed-out wait failed to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutReason {
    /// The device kept answering after the command.
    StillResponsive,
    /// The device never reached its home or setup shell.
    NotBooted,
}

impl fmt::Display for TimeoutReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::StillResponsive => "failed to become unresponsive",
            Self::NotBooted => "failed to become responsive",
        })
    }
}

/// Phases of a lifecycle operation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecyclePhase {
    /// Nothing issued yet.
    Idle,
    /// Sending the power command.
    Commanding,
    /// Waiting for the device to stop responding.
    AwaitingDown,
    /// Waiting for the device to boot to its shell.
    AwaitingUp,
    /// The operation finished.
    Complete,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Idle => "idle",
            Self::Commanding => "commanding",
            Self::AwaitingDown => "awaiting-down",
            Self::AwaitingUp => "awaiting-up",
            Self::Complete => "complete",
        })
    }
}

/// Device operations the orchestrator drives.
pub trait LifecycleTarget {
    /// Issues the power command. Faults are fatal to the operation.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the command.
    fn issue(&self, operation: LifecycleOperation, address: &DeviceAddress)
    -> Result<(), DeviceError>;

    /// Returns `true` when both liveness checks fail for `address`.
    fn is_unresponsive(&self, address: &DeviceAddress) -> bool;

    /// Lists the processes running in `target`.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the query.
    fn running_processes(
        &self,
        address: &DeviceAddress,
        target: OperatingTarget,
    ) -> Result<Vec<ProcessInfo>, DeviceError>;
}

/// Timing of a completed lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Operation that completed.
    pub operation: LifecycleOperation,
    /// Time until the device stopped responding.
    pub down_after: Duration,
    /// Budget handed to the boot wait; `None` for a shutdown.
    pub up_budget: Option<TimeoutBudget>,
    /// Time the boot wait took; `None` for a shutdown.
    pub up_after: Option<Duration>,
}

/// Drives the command, down and up phases against a [`LifecycleTarget`].
pub struct LifecycleOrchestrator<'a, T: ?Sized, C: ?Sized> {
    target: &'a T,
    clock: &'a C,
    policy: RetryPolicy,
    shell_processes: &'a [&'a str],
}

impl<'a, T, C> LifecycleOrchestrator<'a, T, C>
where
    T: LifecycleTarget + ?Sized,
    C: Clock + ?Sized,
{
    /// Builds an orchestrator that treats any of `shell_processes` running in
    /// the system partition as "booted".
    #[must_use]
    pub const fn new(
        target: &'a T,
        clock: &'a C,
        policy: RetryPolicy,
        shell_processes: &'a [&'a str],
    ) -> Self {
        Self {
            target,
            clock,
            policy,
            shell_processes,
        }
    }

    /// Reboots the device at `address` and waits for it to boot.
    ///
    /// # Errors
    ///
    /// Returns the command's fault, or [`DeviceError::Timeout`] when either
    /// wait exhausts `budget`.
    pub fn reboot(
        &self,
        address: &DeviceAddress,
        budget: TimeoutBudget,
    ) -> Result<LifecycleReport, DeviceError> {
        self.reboot_between(address, address, budget)
    }

    /// Reboots the device at `old`, waiting for it to go down on `old` and to
    /// come back on `new`.
    ///
    /// # Errors
    ///
    /// Returns the command's fault, or [`DeviceError::Timeout`] when either
    /// wait exhausts `budget`.
    pub fn reboot_between(
        &self,
        old: &DeviceAddress,
        new: &DeviceAddress,
        budget: TimeoutBudget,
    ) -> Result<LifecycleReport, DeviceError> {
        let operation = LifecycleOperation::Reboot;
        self.command(operation, old)?;
        let (down_after, remaining) = self.await_down(operation, old, budget)?;
        let up_after = self.await_up(new, budget, remaining)?;
        enter(operation, LifecyclePhase::Complete, new);
        Ok(LifecycleReport {
            operation,
            down_after,
            up_budget: Some(remaining),
            up_after: Some(up_after),
        })
    }

    /// Shuts the device down and waits for it to stop responding.
    ///
    /// # Errors
    ///
    /// Returns the command's fault, or [`DeviceError::Timeout`] when the
    /// device still responds once `budget` is exhausted.
    pub fn shutdown(
        &self,
        address: &DeviceAddress,
        budget: TimeoutBudget,
    ) -> Result<LifecycleReport, DeviceError> {
        let operation = LifecycleOperation::Shutdown;
        self.command(operation, address)?;
        let (down_after, _) = self.await_down(operation, address, budget)?;
        enter(operation, LifecyclePhase::Complete, address);
        Ok(LifecycleReport {
            operation,
            down_after,
            up_budget: None,
            up_after: None,
        })
    }

    fn command(
        &self,
        operation: LifecycleOperation,
        address: &DeviceAddress,
    ) -> Result<(), DeviceError> {
        enter(operation, LifecyclePhase::Commanding, address);
        self.target.issue(operation, address).inspect_err(|error| {
            warn!(target: LIFECYCLE_TARGET, %operation, %address, %error, "command rejected");
        })
    }

    fn await_down(
        &self,
        operation: LifecycleOperation,
        address: &DeviceAddress,
        budget: TimeoutBudget,
    ) -> Result<(Duration, TimeoutBudget), DeviceError> {
        enter(operation, LifecyclePhase::AwaitingDown, address);
        let watch = Stopwatch::start(self.clock);
        let down = retry_until(self.clock, self.policy, budget, || {
            self.target.is_unresponsive(address)
        });
        let elapsed = watch.elapsed();
        if !down {
            return Err(timeout(operation, address, TimeoutReason::StillResponsive, budget));
        }
        let remaining = budget.remaining_after(elapsed);
        debug!(
            target: LIFECYCLE_TARGET,
            %operation,
            %address,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            %remaining,
            "device went down"
        );
        Ok((elapsed, remaining))
    }

    fn await_up(
        &self,
        address: &DeviceAddress,
        budget: TimeoutBudget,
        remaining: TimeoutBudget,
    ) -> Result<Duration, DeviceError> {
        let operation = LifecycleOperation::Reboot;
        enter(operation, LifecyclePhase::AwaitingUp, address);
        let watch = Stopwatch::start(self.clock);
        let mut failure = None;
        let booted = retry_until(self.clock, self.policy, remaining, || {
            // A hard failure stops the polling; it is reported below.
            self.shell_running(address).unwrap_or_else(|error| {
                failure = Some(error);
                true
            })
        });
        if let Some(error) = failure {
            warn!(target: LIFECYCLE_TARGET, %address, %error, "boot wait failed");
            return Err(error);
        }
        if !booted {
            return Err(timeout(operation, address, TimeoutReason::NotBooted, budget));
        }
        Ok(watch.elapsed())
    }

    /// Faults the device raises while booting mean "not yet"; anything else
    /// ends the wait.
    fn shell_running(&self, address: &DeviceAddress) -> Result<bool, DeviceError> {
        match self
            .target
            .running_processes(address, OperatingTarget::System)
        {
            Ok(processes) => Ok(processes
                .iter()
                .any(|process| is_shell_process(&process.image_name, self.shell_processes))),
            Err(error) if error.is_transient() => {
                debug!(target: LIFECYCLE_TARGET, %address, %error, "device not ready");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }
}

fn enter(operation: LifecycleOperation, phase: LifecyclePhase, address: &DeviceAddress) {
    info!(target: LIFECYCLE_TARGET, %operation, %phase, %address, "lifecycle phase");
}

fn timeout(
    operation: LifecycleOperation,
    address: &DeviceAddress,
    reason: TimeoutReason,
    budget: TimeoutBudget,
) -> DeviceError {
    warn!(target: LIFECYCLE_TARGET, %operation, %address, %reason, %budget, "lifecycle timed out");
    DeviceError::Timeout {
        operation,
        address: address.clone(),
        reason,
        budget,
    }
}

/// Matches an image name, with or without a directory prefix, against the
/// shell process list.
fn is_shell_process(image_name: &str, shell_processes: &[&str]) -> bool {
    let file_name = image_name.rsplit('\\').next().unwrap_or(image_name);
    shell_processes
        .iter()
        .any(|shell| shell.eq_ignore_ascii_case(file_name))
}

#[cfg(test)]
mod tests;
