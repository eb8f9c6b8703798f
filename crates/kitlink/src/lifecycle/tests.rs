//! Tests for reboot and shutdown orchestration.

use std::cell::RefCell;
use std::io;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::clock::ManualClock;
use crate::facade::{NativeFault, codes};
use crate::path::PathError;

const SHELLS: &[&str] = &["Home.exe", "Oobe.exe"];

/// A device driven by a manual clock: responsive until `down_after`, then
/// unable to answer process queries until `booting_after`, then running a
/// system process set that gains the shell at `booted_after`.
struct ScriptedTarget {
    clock: ManualClock,
    down_after: Duration,
    booting_after: Duration,
    booted_after: Option<Duration>,
    command_fault: Option<NativeFault>,
    query_failure: Option<DeviceError>,
    issued: RefCell<Vec<(LifecycleOperation, String)>>,
    down_probes: RefCell<Vec<String>>,
    process_queries: RefCell<Vec<(Duration, String)>>,
}

impl ScriptedTarget {
    fn new(clock: &ManualClock, down_after: Duration) -> Self {
        Self {
            clock: clock.clone(),
            down_after,
            booting_after: down_after + Duration::from_secs(2),
            booted_after: Some(down_after + Duration::from_secs(3)),
            command_fault: None,
            query_failure: None,
            issued: RefCell::new(Vec::new()),
            down_probes: RefCell::new(Vec::new()),
            process_queries: RefCell::new(Vec::new()),
        }
    }

    fn never_boots(mut self) -> Self {
        self.booted_after = None;
        self
    }

    fn rejecting_commands(mut self) -> Self {
        self.command_fault = Some(NativeFault::new(codes::GENERIC_FAILURE, "access denied"));
        self
    }

    fn failing_queries_with(mut self, error: DeviceError) -> Self {
        self.query_failure = Some(error);
        self
    }

    fn query_span(&self) -> Duration {
        let queries = self.process_queries.borrow();
        match (queries.first(), queries.last()) {
            (Some((first, _)), Some((last, _))) => last.saturating_sub(*first),
            _ => Duration::ZERO,
        }
    }
}

impl LifecycleTarget for ScriptedTarget {
    fn issue(
        &self,
        operation: LifecycleOperation,
        address: &DeviceAddress,
    ) -> Result<(), DeviceError> {
        self.issued
            .borrow_mut()
            .push((operation, address.host().to_owned()));
        match &self.command_fault {
            Some(fault) => Err(DeviceError::Native(fault.clone())),
            None => Ok(()),
        }
    }

    fn is_unresponsive(&self, address: &DeviceAddress) -> bool {
        self.down_probes.borrow_mut().push(address.host().to_owned());
        self.clock.elapsed() >= self.down_after
    }

    fn running_processes(
        &self,
        address: &DeviceAddress,
        _target: OperatingTarget,
    ) -> Result<Vec<ProcessInfo>, DeviceError> {
        let now = self.clock.elapsed();
        self.process_queries
            .borrow_mut()
            .push((now, address.host().to_owned()));
        if let Some(error) = &self.query_failure {
            return Err(error.clone());
        }
        if now < self.booting_after {
            return Err(DeviceError::Native(NativeFault::new(
                codes::RPC_SERVER_UNAVAILABLE,
                "The RPC server is unavailable.",
            )));
        }
        let mut processes = vec![ProcessInfo {
            process_id: 4,
            image_name: "SystemOS.exe".to_owned(),
        }];
        if self.booted_after.is_some_and(|at| now >= at) {
            processes.push(ProcessInfo {
                process_id: 90,
                image_name: "\\Windows\\System32\\HOME.EXE".to_owned(),
            });
        }
        Ok(processes)
    }
}

#[fixture]
fn clock() -> ManualClock {
    ManualClock::new()
}

#[fixture]
fn address() -> DeviceAddress {
    DeviceAddress::new("10.0.0.7")
}

fn orchestrator<'a>(
    target: &'a ScriptedTarget,
    clock: &'a ManualClock,
) -> LifecycleOrchestrator<'a, ScriptedTarget, ManualClock> {
    LifecycleOrchestrator::new(target, clock, RetryPolicy::default(), SHELLS)
}

#[rstest]
fn reboot_hands_the_remaining_budget_to_the_boot_wait(
    clock: ManualClock,
    address: DeviceAddress,
) {
    let target = ScriptedTarget::new(&clock, Duration::from_secs(2));
    let report = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::finite(Duration::from_secs(10)))
        .expect("reboot completes");

    assert_eq!(report.down_after, Duration::from_secs(2));
    assert_eq!(
        report.up_budget,
        Some(TimeoutBudget::finite(Duration::from_secs(8)))
    );
    assert_eq!(report.up_after, Some(Duration::from_secs(3)));
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
}

#[rstest]
fn boot_wait_polls_for_the_rest_of_the_budget(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::from_secs(2)).never_boots();
    let error = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::finite(Duration::from_secs(10)))
        .expect_err("boot wait times out");

    match error {
        DeviceError::Timeout {
            operation, reason, ..
        } => {
            assert_eq!(operation, LifecycleOperation::Reboot);
            assert_eq!(reason, TimeoutReason::NotBooted);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(
        target.query_span() >= Duration::from_secs(8),
        "boot wait polled for only {:?}",
        target.query_span()
    );
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}

#[rstest]
fn faults_while_booting_are_retried(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::ZERO);
    orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::finite(Duration::from_secs(30)))
        .expect("reboot completes");

    let queries = target.process_queries.borrow();
    assert!(queries.len() > 1);
    assert_eq!(queries.first().map(|(at, _)| *at), Some(Duration::ZERO));
}

#[rstest]
fn host_side_failure_during_boot_wait_is_not_retried(clock: ManualClock, address: DeviceAddress) {
    let failure = DeviceError::host_io("/srv/kit/session.log", io::Error::other("disk full"));
    let target = ScriptedTarget::new(&clock, Duration::from_secs(2)).failing_queries_with(failure);
    let error = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::finite(Duration::from_secs(30)))
        .expect_err("boot wait surfaces the failure");

    assert!(matches!(error, DeviceError::HostIo { .. }));
    assert_eq!(target.process_queries.borrow().len(), 1);
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
}

#[rstest]
fn invalid_path_during_boot_wait_is_not_retried(clock: ManualClock, address: DeviceAddress) {
    let failure = DeviceError::InvalidPath(PathError::Empty);
    let target = ScriptedTarget::new(&clock, Duration::ZERO).failing_queries_with(failure);
    let error = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::Infinite)
        .expect_err("boot wait surfaces the failure");

    assert!(matches!(error, DeviceError::InvalidPath(PathError::Empty)));
    assert_eq!(target.process_queries.borrow().len(), 1);
}

#[rstest]
fn device_that_never_goes_down_times_out(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::from_secs(3_600));
    let error = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::finite(Duration::from_secs(3)))
        .expect_err("down wait times out");

    assert!(matches!(
        error,
        DeviceError::Timeout {
            reason: TimeoutReason::StillResponsive,
            ..
        }
    ));
    assert_eq!(
        error.to_string(),
        "reboot of 10.0.0.7 failed to become unresponsive within 3000 ms"
    );
    assert!(target.process_queries.borrow().is_empty());
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
}

#[rstest]
fn rejected_command_is_fatal(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::ZERO).rejecting_commands();
    let error = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::Infinite)
        .expect_err("command fails");

    assert!(matches!(error, DeviceError::Native(_)));
    assert!(target.down_probes.borrow().is_empty());
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[rstest]
fn shutdown_stops_once_the_device_is_down(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::from_secs(4));
    let report = orchestrator(&target, &clock)
        .shutdown(&address, TimeoutBudget::finite(Duration::from_secs(60)))
        .expect("shutdown completes");

    assert_eq!(report.operation, LifecycleOperation::Shutdown);
    assert_eq!(report.down_after, Duration::from_secs(4));
    assert_eq!(report.up_budget, None);
    assert!(target.process_queries.borrow().is_empty());
    assert_eq!(
        target.issued.borrow().as_slice(),
        &[(LifecycleOperation::Shutdown, "10.0.0.7".to_owned())]
    );
}

#[rstest]
fn reboot_between_addresses_watches_old_then_new(clock: ManualClock) {
    let old = DeviceAddress::new("10.0.0.7");
    let new = DeviceAddress::new("10.0.0.8");
    let target = ScriptedTarget::new(&clock, Duration::from_secs(1));
    orchestrator(&target, &clock)
        .reboot_between(&old, &new, TimeoutBudget::Infinite)
        .expect("reboot completes");

    assert_eq!(
        target.issued.borrow().first().map(|(_, host)| host.clone()),
        Some(String::from("10.0.0.7"))
    );
    assert!(target.down_probes.borrow().iter().all(|host| host == "10.0.0.7"));
    assert!(
        target
            .process_queries
            .borrow()
            .iter()
            .all(|(_, host)| host == "10.0.0.8")
    );
}

#[rstest]
fn infinite_budget_waits_out_a_slow_reboot(clock: ManualClock, address: DeviceAddress) {
    let target = ScriptedTarget::new(&clock, Duration::from_secs(400));
    let report = orchestrator(&target, &clock)
        .reboot(&address, TimeoutBudget::Infinite)
        .expect("reboot completes");

    assert_eq!(report.down_after, Duration::from_secs(400));
    assert_eq!(report.up_budget, Some(TimeoutBudget::Infinite));
}

#[rstest]
#[case("Home.exe", true)]
#[case("home.EXE", true)]
#[case("\\Windows\\Oobe.exe", true)]
#[case("SystemOS.exe", false)]
#[case("HomeHelper.exe", false)]
fn shell_names_match_case_insensitively(#[case] image: &str, #[case] expected: bool) {
    assert_eq!(is_shell_process(image, SHELLS), expected);
}

#[test]
fn phases_are_ordered() {
    assert!(LifecyclePhase::Idle < LifecyclePhase::Commanding);
    assert!(LifecyclePhase::AwaitingDown < LifecyclePhase::AwaitingUp);
    assert_eq!(LifecyclePhase::AwaitingUp.to_string(), "awaiting-up");
}
