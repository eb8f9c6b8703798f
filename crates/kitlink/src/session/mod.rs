//! Device sessions.
//!
//! A [`Console`] owns everything one conversation with a device needs: the
//! immutable address, a shared facade handle, the implementation selected
//! for the installed kit, and the reboot fault state that classifies every
//! call made through the session. Lifecycle and tree operations borrow these
//! pieces for the duration of a call.

mod settings;


use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use kitlink_config::Config;
use tracing::info;

use crate::address::DeviceAddress;
use crate::budget::TimeoutBudget;
use crate::clock::{Clock, SystemClock};
use crate::error::{DeviceError, ResolveError};
use crate::facade::{DeviceFacade, ProcessInfo, RemoteFileInfo};
use crate::fault::{Guarded, RebootSignals};
use crate::lifecycle::{LifecycleOperation, LifecycleOrchestrator, LifecycleReport, LifecycleTarget};
use crate::liveness::{LivenessProber, NetworkProbe, TcpPing};
use crate::path::{OperatingTarget, RemotePath};
use crate::progress::ProgressSink;
use crate::transfer::TransferHandle;
use crate::tree::{DeleteSummary, TransferSummary, TreeWalker};
use crate::version::{KitImplementation, select_implementation};

pub use settings::RuntimeSettings;

/// Tracing target for session setup.
const SESSION_TARGET: &str = "kitlink::session";

/// A session with one device.
pub struct Console<F: ?Sized> {
    address: DeviceAddress,
    implementation: Arc<KitImplementation>,
    settings: RuntimeSettings,
    clock: Arc<dyn Clock>,
    liveness: LivenessProber,
    signals: Mutex<RebootSignals>,
    facade: Arc<F>,
}

impl<F: DeviceFacade + ?Sized> Console<F> {
    /// Opens a session on `address` with default settings, the system clock
    /// and a TCP reachability probe.
    #[must_use]
    pub fn new(
        address: DeviceAddress,
        facade: Arc<F>,
        implementation: Arc<KitImplementation>,
    ) -> Self {
        let settings = RuntimeSettings::default();
        Self {
            address,
            implementation,
            settings,
            clock: Arc::new(SystemClock),
            liveness: LivenessProber::new(Arc::new(TcpPing::new(settings.liveness))),
            signals: Mutex::new(RebootSignals::default()),
            facade,
        }
    }

    /// Opens a session using `config`, selecting the implementation for the
    /// kit installed under its kit root once per process.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] when the installed kit cannot be resolved.
    pub fn connect(
        address: DeviceAddress,
        facade: Arc<F>,
        config: &Config,
    ) -> Result<Self, ResolveError> {
        let kit_root = config.kit_root();
        let implementation = select_implementation(&kit_root)?;
        info!(
            target: SESSION_TARGET,
            %address,
            %kit_root,
            version = %implementation.version,
            generation = %implementation.generation,
            "session opened"
        );
        Ok(Self::new(address, facade, implementation)
            .with_settings(RuntimeSettings::from_config(config)))
    }

    /// Replaces the runtime settings.
    ///
    /// The network probe is rebuilt from the new liveness settings, so call
    /// this before [`Console::with_network_probe`].
    #[must_use]
    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self.liveness = LivenessProber::new(Arc::new(TcpPing::new(settings.liveness)));
        self
    }

    /// Replaces the clock used by every wait.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the network-layer reachability probe.
    #[must_use]
    pub fn with_network_probe(mut self, probe: Arc<dyn NetworkProbe>) -> Self {
        self.liveness = LivenessProber::new(probe);
        self
    }

    /// Address every call is routed to.
    #[must_use]
    pub const fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Implementation selected for the installed kit.
    #[must_use]
    pub fn implementation(&self) -> &KitImplementation {
        &self.implementation
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Snapshot of the reboot fault state.
    #[must_use]
    pub fn reboot_signals(&self) -> RebootSignals {
        *self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reboots the device and waits until it is back at its shell.
    ///
    /// # Errors
    ///
    /// Returns the command's classified fault, or [`DeviceError::Timeout`]
    /// when the device does not go down and come back within `budget`.
    pub fn reboot(&self, budget: TimeoutBudget) -> Result<LifecycleReport, DeviceError> {
        self.orchestrator().reboot(&self.address, budget)
    }

    /// Reboots with the configured default budget.
    ///
    /// # Errors
    ///
    /// As for [`Console::reboot`].
    pub fn reboot_with_default_budget(&self) -> Result<LifecycleReport, DeviceError> {
        self.reboot(self.settings.reboot_budget)
    }

    /// Reboots the device and waits for it to come back on `new_address`.
    ///
    /// The session keeps its own address; open a new session on
    /// `new_address` afterwards.
    ///
    /// # Errors
    ///
    /// As for [`Console::reboot`].
    pub fn reboot_to(
        &self,
        new_address: &DeviceAddress,
        budget: TimeoutBudget,
    ) -> Result<LifecycleReport, DeviceError> {
        self.orchestrator()
            .reboot_between(&self.address, new_address, budget)
    }

    /// Shuts the device down and waits until it stops responding.
    ///
    /// # Errors
    ///
    /// Returns the command's classified fault, or [`DeviceError::Timeout`]
    /// when the device still responds once `budget` is spent.
    pub fn shutdown(&self, budget: TimeoutBudget) -> Result<LifecycleReport, DeviceError> {
        self.orchestrator().shutdown(&self.address, budget)
    }

    /// Shuts down with the configured default budget.
    ///
    /// # Errors
    ///
    /// As for [`Console::shutdown`].
    pub fn shutdown_with_default_budget(&self) -> Result<LifecycleReport, DeviceError> {
        self.shutdown(self.settings.shutdown_budget)
    }

    /// Attempts a protocol-level connection.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the attempt.
    pub fn can_connect(&self) -> Result<bool, DeviceError> {
        self.guarded().call(|facade, address| facade.can_connect(address))
    }

    /// Returns `true` when the device answers both liveness checks.
    #[must_use]
    pub fn is_responsive(&self) -> bool {
        self.liveness
            .is_responsive(&self.address, || self.can_connect())
    }

    /// Returns `true` when the device fails both liveness checks.
    #[must_use]
    pub fn is_unresponsive(&self) -> bool {
        LifecycleTarget::is_unresponsive(self, &self.address)
    }

    /// Lists the processes running in `target`.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the query.
    pub fn running_processes(
        &self,
        target: OperatingTarget,
    ) -> Result<Vec<ProcessInfo>, DeviceError> {
        LifecycleTarget::running_processes(self, &self.address, target)
    }

    /// Looks up the entry at `path`; `None` when nothing exists there.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the search.
    pub fn resolve_entry(&self, path: &RemotePath) -> Result<Option<RemoteFileInfo>, DeviceError> {
        self.walker().resolve_entry(path)
    }

    /// Returns `true` when a file exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the search.
    pub fn file_exists(&self, path: &RemotePath) -> Result<bool, DeviceError> {
        self.walker().file_exists(path)
    }

    /// Returns `true` when a directory exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns the classified fault raised by the search.
    pub fn directory_exists(&self, path: &RemotePath) -> Result<bool, DeviceError> {
        self.walker().directory_exists(path)
    }

    /// Lists the immediate children of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`], [`DeviceError::NotADirectory`] or
    /// the classified fault raised by the listing.
    pub fn list_directory(&self, path: &RemotePath) -> Result<Vec<RemoteFileInfo>, DeviceError> {
        self.walker().list_directory(path)
    }

    /// Deletes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotFound`] or the classified fault.
    pub fn delete_file(&self, path: &RemotePath) -> Result<(), DeviceError> {
        self.walker().delete_file(path)
    }

    /// Deletes the directory at `root`, emptying it first when `recursive`.
    ///
    /// # Errors
    ///
    /// See [`TreeWalker::delete_directory`].
    pub fn delete_directory(
        &self,
        root: &RemotePath,
        recursive: bool,
    ) -> Result<DeleteSummary, DeviceError> {
        self.walker().delete_directory(root, recursive)
    }

    /// Uploads a host directory.
    ///
    /// # Errors
    ///
    /// See [`TreeWalker::send_directory`].
    pub fn send_directory(
        &self,
        source: &Utf8Path,
        destination: &RemotePath,
        recursive: bool,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<TransferSummary, DeviceError> {
        self.walker()
            .send_directory(source, destination, recursive, sink)
    }

    /// Downloads a remote directory.
    ///
    /// # Errors
    ///
    /// See [`TreeWalker::receive_directory`].
    pub fn receive_directory(
        &self,
        source: &RemotePath,
        destination: &Utf8Path,
        recursive: bool,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<TransferSummary, DeviceError> {
        self.walker()
            .receive_directory(source, destination, recursive, sink)
    }

    fn guarded(&self) -> Guarded<'_, F> {
        self.guarded_at(&self.address)
    }

    fn guarded_at<'a>(&'a self, address: &'a DeviceAddress) -> Guarded<'a, F> {
        Guarded::new(&*self.facade, address, &self.signals)
    }

    fn walker(&self) -> TreeWalker<'_, F> {
        TreeWalker::new(self.guarded(), self.implementation.generation)
    }

    fn orchestrator(&self) -> LifecycleOrchestrator<'_, Self, dyn Clock> {
        LifecycleOrchestrator::new(
            self,
            &*self.clock,
            self.settings.retry_policy,
            self.implementation.generation.shell_processes(),
        )
    }
}

impl<F: DeviceFacade + ?Sized + 'static> Console<F> {
    /// Uploads a host directory on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::SpawnWorker`] when the worker cannot start.
    /// Transfer failures surface from [`TransferHandle::join`].
    pub fn spawn_send_directory(
        self: &Arc<Self>,
        source: Utf8PathBuf,
        destination: RemotePath,
        recursive: bool,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Result<TransferHandle<TransferSummary>, DeviceError> {
        let console = Arc::clone(self);
        TransferHandle::spawn("send", move |token| {
            console.walker().with_cancellation(token).send_directory(
                &source,
                &destination,
                recursive,
                sink.as_deref(),
            )
        })
    }

    /// Downloads a remote directory on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::SpawnWorker`] when the worker cannot start.
    /// Transfer failures surface from [`TransferHandle::join`].
    pub fn spawn_receive_directory(
        self: &Arc<Self>,
        source: RemotePath,
        destination: Utf8PathBuf,
        recursive: bool,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Result<TransferHandle<TransferSummary>, DeviceError> {
        let console = Arc::clone(self);
        TransferHandle::spawn("receive", move |token| {
            console.walker().with_cancellation(token).receive_directory(
                &source,
                &destination,
                recursive,
                sink.as_deref(),
            )
        })
    }

    /// Deletes a remote directory on a worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::SpawnWorker`] when the worker cannot start.
    /// Walk failures surface from [`TransferHandle::join`].
    pub fn spawn_delete_directory(
        self: &Arc<Self>,
        root: RemotePath,
        recursive: bool,
    ) -> Result<TransferHandle<DeleteSummary>, DeviceError> {
        let console = Arc::clone(self);
        TransferHandle::spawn("delete", move |token| {
            console
                .walker()
                .with_cancellation(token)
                .delete_directory(&root, recursive)
        })
    }
}

impl<F: DeviceFacade + ?Sized> LifecycleTarget for Console<F> {
    fn issue(
        &self,
        operation: LifecycleOperation,
        address: &DeviceAddress,
    ) -> Result<(), DeviceError> {
        let device = self.guarded_at(address);
        match operation {
            LifecycleOperation::Reboot => device.call(|facade, address| facade.reboot(address)),
            LifecycleOperation::Shutdown => device.call(|facade, address| facade.shutdown(address)),
        }
    }

    fn is_unresponsive(&self, address: &DeviceAddress) -> bool {
        self.liveness.is_unresponsive(address, || {
            self.guarded_at(address)
                .call(|facade, address| facade.can_connect(address))
        })
    }

    fn running_processes(
        &self,
        address: &DeviceAddress,
        target: OperatingTarget,
    ) -> Result<Vec<ProcessInfo>, DeviceError> {
        self.guarded_at(address)
            .call(|facade, address| facade.running_processes(address, target))
    }
}

impl<F: ?Sized> std::fmt::Debug for Console<F> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Console")
            .field("address", &self.address)
            .field("implementation", &self.implementation)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
