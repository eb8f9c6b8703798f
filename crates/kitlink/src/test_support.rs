//! In-memory device used by tests.
//!
//! [`SimulatedDevice`] implements [`DeviceFacade`] and [`NetworkProbe`] over
//! an in-memory remote namespace and a scripted power timeline driven by a
//! [`ManualClock`]. Host-side copy endpoints are real paths so transfers can
//! be checked against a temporary directory.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camino::Utf8Path;

use crate::address::DeviceAddress;
use crate::clock::ManualClock;
use crate::facade::{
    CopyLocation, CopyRequest, DeviceFacade, FileTransferProgress, NativeFault, NativeResult,
    ProcessInfo, RecursionLevel, RemoteFileInfo, SearchPattern, codes,
};
use crate::liveness::NetworkProbe;
use crate::path::{OperatingTarget, PathError, RemotePath};
use crate::session::Console;
use crate::version::{BuildKey, KitGeneration, KitImplementation, KitVersion};

/// Bytes reported per progress event.
const PROGRESS_CHUNK: usize = 64;

/// Implementation record for `generation`, as resolved from its reference
/// version stamp.
#[must_use]
pub fn implementation_for(generation: KitGeneration) -> Arc<KitImplementation> {
    let (build, branch, timestamp) = match generation {
        KitGeneration::Rel1411 => (11_785, "xb_rel_1411", "150101-0000"),
        KitGeneration::Rel1506 => (12_309, "xb_rel_1506", "150610-1200"),
    };
    Arc::new(KitImplementation {
        version: KitVersion {
            major: 10,
            minor: 0,
            build,
            revision: 0,
            branch: branch.to_owned(),
            timestamp: timestamp.to_owned(),
        },
        build: BuildKey::new(build),
        generation,
    })
}

/// Opens a session on `device` that waits on the device's clock and probes
/// reachability through the device itself.
#[must_use]
pub fn simulated_console(
    device: &Arc<SimulatedDevice>,
    generation: KitGeneration,
) -> Console<SimulatedDevice> {
    Console::new(
        DeviceAddress::new("10.0.0.7"),
        Arc::clone(device),
        implementation_for(generation),
    )
    .with_clock(Arc::new(device.clock().clone()))
    .with_network_probe(Arc::clone(device) as Arc<dyn NetworkProbe>)
}

/// Facade primitives, for fault injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacadeOperation {
    /// [`DeviceFacade::reboot`].
    Reboot,
    /// [`DeviceFacade::shutdown`].
    Shutdown,
    /// [`DeviceFacade::can_connect`].
    CanConnect,
    /// [`DeviceFacade::running_processes`].
    RunningProcesses,
    /// [`DeviceFacade::find_files`].
    FindFiles,
    /// [`DeviceFacade::copy_files`].
    CopyFiles,
    /// [`DeviceFacade::delete_files`].
    DeleteFiles,
    /// [`DeviceFacade::remove_directory`].
    RemoveDirectory,
    /// [`DeviceFacade::make_directory`].
    MakeDirectory,
}

/// One facade call as the device saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Device time of the call.
    pub at: Duration,
    /// Primitive invoked.
    pub operation: FacadeOperation,
    /// Host of the address the call was routed to.
    pub host: String,
    /// Operation-specific detail, such as the path involved.
    pub detail: String,
}

/// Timeline of a reboot, relative to the moment the command is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootScript {
    /// The device keeps answering until this point.
    pub down_after: Duration,
    /// The network stack and protocol answer again from this point.
    pub booting_after: Duration,
    /// The home shell is running from this point.
    pub home_after: Duration,
}

impl Default for RebootScript {
    fn default() -> Self {
        Self {
            down_after: Duration::from_secs(2),
            booting_after: Duration::from_secs(20),
            home_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Power {
    Up,
    Down,
    Booting,
}

#[derive(Debug, Clone, Copy)]
enum PowerCommand {
    Reboot { at: Duration },
    Shutdown { at: Duration },
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Entry {
    path: RemotePath,
    node: Node,
}

type Key = (OperatingTarget, String);

fn key_of(path: &RemotePath) -> Key {
    (path.target(), path.as_str().to_ascii_lowercase())
}

#[derive(Debug)]
struct DeviceState {
    entries: BTreeMap<Key, Entry>,
    fail_empty_listings: bool,
    honour_recursion: bool,
    script: RebootScript,
    command: Option<PowerCommand>,
    refused_connects: u32,
    injected: VecDeque<(FacadeOperation, NativeFault)>,
    calls: Vec<RecordedCall>,
}

/// In-memory device with scripted power behaviour.
#[derive(Debug)]
pub struct SimulatedDevice {
    clock: ManualClock,
    state: Mutex<DeviceState>,
}

impl SimulatedDevice {
    /// A powered-up device with an empty namespace that honours recursion
    /// levels and lists empty directories normally.
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            state: Mutex::new(DeviceState {
                entries: BTreeMap::new(),
                fail_empty_listings: false,
                honour_recursion: true,
                script: RebootScript::default(),
                command: None,
                refused_connects: 0,
                injected: VecDeque::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Adopts the primitive quirks of `generation`.
    #[must_use]
    pub fn with_generation(self, generation: KitGeneration) -> Self {
        let legacy = !generation.honours_recursion_level();
        self.honouring_recursion(!legacy).failing_empty_listings(legacy)
    }

    /// Makes listings of empty directories fail with "path not found".
    #[must_use]
    pub fn failing_empty_listings(self, fail: bool) -> Self {
        self.lock().fail_empty_listings = fail;
        self
    }

    /// Makes the copy primitive honour or ignore its recursion level.
    #[must_use]
    pub fn honouring_recursion(self, honour: bool) -> Self {
        self.lock().honour_recursion = honour;
        self
    }

    /// Replaces the reboot timeline.
    #[must_use]
    pub fn with_reboot_script(self, script: RebootScript) -> Self {
        self.lock().script = script;
        self
    }

    /// Clock driving the power timeline.
    #[must_use]
    pub const fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Creates a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] when `path` is not a valid remote path.
    pub fn add_directory(
        &self,
        path: &str,
        target: OperatingTarget,
    ) -> Result<RemotePath, PathError> {
        let path = RemotePath::new(path, target)?;
        let mut state = self.lock();
        state.insert_with_parents(&path, Node::Directory);
        Ok(path)
    }

    /// Creates a file and any missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`] when `path` is not a valid remote path.
    pub fn add_file(
        &self,
        path: &str,
        target: OperatingTarget,
        contents: impl Into<Vec<u8>>,
    ) -> Result<RemotePath, PathError> {
        let path = RemotePath::new(path, target)?;
        let mut state = self.lock();
        state.insert_with_parents(&path, Node::File(contents.into()));
        Ok(path)
    }

    /// Returns `true` when an entry exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &RemotePath) -> bool {
        path.is_root() || self.lock().entries.contains_key(&key_of(path))
    }

    /// Contents of the file at `path`.
    #[must_use]
    pub fn file_contents(&self, path: &RemotePath) -> Option<Vec<u8>> {
        match self.lock().entries.get(&key_of(path)) {
            Some(Entry {
                node: Node::File(contents),
                ..
            }) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Number of entries strictly below `directory`.
    #[must_use]
    pub fn descendant_count(&self, directory: &RemotePath) -> usize {
        let state = self.lock();
        state.descendants(directory).count()
    }

    /// Fails the next call of `operation` with `fault`.
    pub fn inject_fault(&self, operation: FacadeOperation, fault: NativeFault) {
        self.lock().injected.push_back((operation, fault));
    }

    /// Every facade call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Calls of one primitive.
    #[must_use]
    pub fn calls_of(&self, operation: FacadeOperation) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call, then applies any injected fault and the power state.
    fn enter(
        &self,
        operation: FacadeOperation,
        address: &DeviceAddress,
        detail: impl Into<String>,
    ) -> NativeResult<MutexGuard<'_, DeviceState>> {
        let now = self.clock.elapsed();
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            at: now,
            operation,
            host: address.host().to_owned(),
            detail: detail.into(),
        });
        if let Some(index) = state
            .injected
            .iter()
            .position(|(injected, _)| *injected == operation)
        {
            if let Some((_, fault)) = state.injected.remove(index) {
                return Err(fault);
            }
        }
        Ok(state)
    }

    fn power(&self, state: &DeviceState) -> Power {
        let now = self.clock.elapsed();
        match state.command {
            None => Power::Up,
            Some(PowerCommand::Shutdown { at }) => {
                if now.saturating_sub(at) < state.script.down_after {
                    Power::Up
                } else {
                    Power::Down
                }
            }
            Some(PowerCommand::Reboot { at }) => {
                let since = now.saturating_sub(at);
                if since < state.script.down_after {
                    Power::Up
                } else if since < state.script.booting_after {
                    Power::Down
                } else if since < state.script.home_after {
                    Power::Booting
                } else {
                    Power::Up
                }
            }
        }
    }

    fn require_up(&self, state: &DeviceState) -> NativeResult<()> {
        match self.power(state) {
            Power::Down => Err(rpc_unavailable()),
            Power::Up | Power::Booting => Ok(()),
        }
    }
}

impl DeviceState {
    fn insert_with_parents(&mut self, path: &RemotePath, node: Node) {
        let mut ancestor = path.parent();
        while let Some(directory) = ancestor {
            if directory.is_root() {
                break;
            }
            self.entries
                .entry(key_of(&directory))
                .or_insert_with(|| Entry {
                    path: directory.clone(),
                    node: Node::Directory,
                });
            ancestor = directory.parent();
        }
        self.entries.insert(
            key_of(path),
            Entry {
                path: path.clone(),
                node,
            },
        );
    }

    fn is_directory(&self, path: &RemotePath) -> bool {
        path.is_root()
            || matches!(
                self.entries.get(&key_of(path)),
                Some(Entry {
                    node: Node::Directory,
                    ..
                })
            )
    }

    fn descendants<'a>(
        &'a self,
        directory: &RemotePath,
    ) -> impl Iterator<Item = &'a Entry> + use<'a> {
        let (target, lowered) = key_of(directory);
        let prefix = if directory.is_root() {
            lowered
        } else {
            format!("{lowered}\\")
        };
        self.entries
            .iter()
            .filter(move |((entry_target, key), _)| {
                *entry_target == target && key.starts_with(&prefix)
            })
            .map(|(_, entry)| entry)
    }

    fn children<'a>(
        &'a self,
        directory: &RemotePath,
    ) -> impl Iterator<Item = &'a Entry> + use<'a> {
        let directory = directory.clone();
        self.descendants(&directory).filter(move |entry| {
            entry
                .path
                .parent()
                .is_some_and(|parent| parent.same_entry(&directory))
        })
    }
}

fn rpc_unavailable() -> NativeFault {
    NativeFault::new(codes::RPC_SERVER_UNAVAILABLE, "The RPC server is unavailable.")
}

fn path_not_found(path: &RemotePath) -> NativeFault {
    NativeFault::new(
        codes::PATH_NOT_FOUND,
        format!("The system cannot find the path specified: {path}"),
    )
}

fn file_not_found(path: &RemotePath) -> NativeFault {
    NativeFault::new(
        codes::FILE_NOT_FOUND,
        format!("The system cannot find the file specified: {path}"),
    )
}

fn host_failure(path: &Utf8Path, error: &std::io::Error) -> NativeFault {
    NativeFault::new(codes::GENERIC_FAILURE, format!("host I/O on {path}: {error}"))
}

fn byte_count(length: usize) -> u64 {
    u64::try_from(length).unwrap_or(u64::MAX)
}

fn report_file(
    source: &str,
    size: usize,
    progress: &mut dyn FnMut(&FileTransferProgress),
) {
    let total_bytes = byte_count(size);
    let mut sent = 0_usize;
    progress(&FileTransferProgress {
        file: source.to_owned(),
        bytes_transferred: 0,
        total_bytes,
    });
    while sent < size {
        sent = (sent + PROGRESS_CHUNK).min(size);
        progress(&FileTransferProgress {
            file: source.to_owned(),
            bytes_transferred: byte_count(sent),
            total_bytes,
        });
    }
}

impl SimulatedDevice {
    fn download(
        state: &DeviceState,
        source: &RemotePath,
        destination: &Utf8Path,
        recursion: RecursionLevel,
        progress: &mut dyn FnMut(&FileTransferProgress),
    ) -> NativeResult<()> {
        match state.entries.get(&key_of(source)) {
            Some(Entry {
                node: Node::File(contents),
                ..
            }) => {
                fs::write(destination, contents).map_err(|error| host_failure(destination, &error))?;
                report_file(source.as_str(), contents.len(), progress);
                Ok(())
            }
            _ if state.is_directory(source) => {
                fs::create_dir_all(destination)
                    .map_err(|error| host_failure(destination, &error))?;
                let children: Vec<Entry> = state.children(source).cloned().collect();
                for child in children {
                    let name = child.path.file_name().unwrap_or_default();
                    let target = destination.join(name);
                    match child.node {
                        Node::File(_) => {
                            Self::download(state, &child.path, &target, recursion, progress)?;
                        }
                        Node::Directory
                            if recursion == RecursionLevel::Unbounded && state.honour_recursion =>
                        {
                            Self::download(state, &child.path, &target, recursion, progress)?;
                        }
                        Node::Directory => {}
                    }
                }
                Ok(())
            }
            _ => Err(file_not_found(source)),
        }
    }

    fn upload(
        state: &mut DeviceState,
        source: &Utf8Path,
        destination: &RemotePath,
        recursion: RecursionLevel,
        progress: &mut dyn FnMut(&FileTransferProgress),
    ) -> NativeResult<()> {
        let metadata = fs::metadata(source).map_err(|error| host_failure(source, &error))?;
        if metadata.is_file() {
            let parent = destination.parent().ok_or_else(|| path_not_found(destination))?;
            if !state.is_directory(&parent) {
                return Err(path_not_found(&parent));
            }
            let contents = fs::read(source).map_err(|error| host_failure(source, &error))?;
            let size = contents.len();
            state.entries.insert(
                key_of(destination),
                Entry {
                    path: destination.clone(),
                    node: Node::File(contents),
                },
            );
            report_file(source.as_str(), size, progress);
            return Ok(());
        }
        if !state.is_directory(destination) {
            return Err(path_not_found(destination));
        }
        let mut children: Vec<_> = fs::read_dir(source)
            .map_err(|error| host_failure(source, &error))?
            .filter_map(Result::ok)
            .filter_map(|entry| camino::Utf8PathBuf::from_path_buf(entry.path()).ok())
            .collect();
        children.sort();
        for child in children {
            let name = child.file_name().unwrap_or_default();
            let target = destination
                .join(name)
                .map_err(|error| NativeFault::new(codes::GENERIC_FAILURE, error.to_string()))?;
            if child.is_dir() {
                if recursion == RecursionLevel::Unbounded && state.honour_recursion {
                    state.insert_with_parents(&target, Node::Directory);
                    Self::upload(state, &child, &target, recursion, progress)?;
                }
            } else {
                Self::upload(state, &child, &target, recursion, progress)?;
            }
        }
        Ok(())
    }
}

impl DeviceFacade for SimulatedDevice {
    fn reboot(&self, address: &DeviceAddress) -> NativeResult<()> {
        let mut state = self.enter(FacadeOperation::Reboot, address, "")?;
        self.require_up(&state)?;
        state.command = Some(PowerCommand::Reboot {
            at: self.clock.elapsed(),
        });
        state.refused_connects = 0;
        Ok(())
    }

    fn shutdown(&self, address: &DeviceAddress) -> NativeResult<()> {
        let mut state = self.enter(FacadeOperation::Shutdown, address, "")?;
        self.require_up(&state)?;
        state.command = Some(PowerCommand::Shutdown {
            at: self.clock.elapsed(),
        });
        state.refused_connects = 0;
        Ok(())
    }

    fn can_connect(&self, address: &DeviceAddress) -> NativeResult<bool> {
        let mut state = self.enter(FacadeOperation::CanConnect, address, "")?;
        if self.power(&state) != Power::Down {
            return Ok(true);
        }
        state.refused_connects += 1;
        if state.refused_connects == 1 {
            Err(NativeFault::new(
                codes::SHUTDOWN_IN_PROGRESS,
                "A system shutdown is in progress.",
            ))
        } else {
            Err(rpc_unavailable())
        }
    }

    fn running_processes(
        &self,
        address: &DeviceAddress,
        target: OperatingTarget,
    ) -> NativeResult<Vec<ProcessInfo>> {
        let state = self.enter(FacadeOperation::RunningProcesses, address, target.to_string())?;
        let power = self.power(&state);
        if power == Power::Down {
            return Err(rpc_unavailable());
        }
        if target == OperatingTarget::Title {
            return Ok(Vec::new());
        }
        let mut processes = vec![ProcessInfo {
            process_id: 4,
            image_name: "SystemOS.exe".to_owned(),
        }];
        if power == Power::Up {
            processes.push(ProcessInfo {
                process_id: 1_200,
                image_name: "Home.exe".to_owned(),
            });
        }
        Ok(processes)
    }

    fn find_files(
        &self,
        address: &DeviceAddress,
        pattern: &SearchPattern,
        recursion: RecursionLevel,
    ) -> NativeResult<Vec<RemoteFileInfo>> {
        let state = self.enter(FacadeOperation::FindFiles, address, pattern.to_string())?;
        self.require_up(&state)?;
        let directory = pattern.directory();
        if !state.is_directory(directory) {
            return Err(path_not_found(directory));
        }
        let candidates: Vec<&Entry> = match recursion {
            RecursionLevel::ThisLevel => state.children(directory).collect(),
            RecursionLevel::Unbounded => state.descendants(directory).collect(),
        };
        if candidates.is_empty() && state.fail_empty_listings && !directory.is_root() {
            return Err(path_not_found(directory));
        }
        Ok(candidates
            .into_iter()
            .filter(|entry| pattern.matches(entry.path.file_name().unwrap_or_default()))
            .map(|entry| RemoteFileInfo {
                path: entry.path.clone(),
                size: match &entry.node {
                    Node::File(contents) => byte_count(contents.len()),
                    Node::Directory => 0,
                },
                is_directory: matches!(entry.node, Node::Directory),
            })
            .collect())
    }

    fn copy_files(
        &self,
        address: &DeviceAddress,
        request: &CopyRequest,
        recursion: RecursionLevel,
        progress: &mut dyn FnMut(&FileTransferProgress),
    ) -> NativeResult<()> {
        let detail = format!("{} -> {}", request.source, request.destination);
        let mut state = self.enter(FacadeOperation::CopyFiles, address, detail)?;
        self.require_up(&state)?;
        match (&request.source, &request.destination) {
            (CopyLocation::Device(source), CopyLocation::Host(destination)) => {
                Self::download(&state, source, destination, recursion, progress)
            }
            (CopyLocation::Host(source), CopyLocation::Device(destination)) => {
                Self::upload(&mut state, source, destination, recursion, progress)
            }
            _ => Err(NativeFault::new(
                codes::GENERIC_FAILURE,
                "copies must cross the host/device boundary",
            )),
        }
    }

    fn delete_files(&self, address: &DeviceAddress, files: &[RemotePath]) -> NativeResult<()> {
        let mut state = self.enter(
            FacadeOperation::DeleteFiles,
            address,
            files.len().to_string(),
        )?;
        self.require_up(&state)?;
        for file in files {
            match state.entries.get(&key_of(file)) {
                Some(Entry {
                    node: Node::File(_),
                    ..
                }) => {
                    state.entries.remove(&key_of(file));
                }
                Some(_) => {
                    return Err(NativeFault::new(
                        codes::GENERIC_FAILURE,
                        format!("{file} is a directory"),
                    ));
                }
                None => return Err(file_not_found(file)),
            }
        }
        Ok(())
    }

    fn remove_directory(&self, address: &DeviceAddress, directory: &RemotePath) -> NativeResult<()> {
        let mut state = self.enter(
            FacadeOperation::RemoveDirectory,
            address,
            directory.to_string(),
        )?;
        self.require_up(&state)?;
        if directory.is_root() || !state.is_directory(directory) {
            return Err(path_not_found(directory));
        }
        if state.children(directory).next().is_some() {
            return Err(NativeFault::new(
                codes::DIRECTORY_NOT_EMPTY,
                "The directory is not empty.",
            ));
        }
        state.entries.remove(&key_of(directory));
        Ok(())
    }

    fn make_directory(&self, address: &DeviceAddress, directory: &RemotePath) -> NativeResult<()> {
        let mut state = self.enter(
            FacadeOperation::MakeDirectory,
            address,
            directory.to_string(),
        )?;
        self.require_up(&state)?;
        if directory.is_root() || state.entries.contains_key(&key_of(directory)) {
            return Err(NativeFault::new(
                codes::ALREADY_EXISTS,
                "Cannot create a file when that file already exists.",
            ));
        }
        let parent = directory.parent().ok_or_else(|| path_not_found(directory))?;
        if !state.is_directory(&parent) {
            return Err(path_not_found(&parent));
        }
        state.insert_with_parents(directory, Node::Directory);
        Ok(())
    }
}

impl NetworkProbe for SimulatedDevice {
    fn is_reachable(&self, _address: &DeviceAddress) -> bool {
        let state = self.lock();
        self.power(&state) != Power::Down
    }
}
