//! Behaviour tests for recursive transfers and deletes.

use std::cell::RefCell;
use std::fs;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::clock::ManualClock;
use crate::test_support::{SimulatedDevice, simulated_console};
use crate::{
    Console, DeleteSummary, KitGeneration, OperatingTarget, RemotePath, TransferMetric,
    TransferSummary,
};

const DATA_DIRECTORY: &str = "XD:\\data";
const UPLOAD_DIRECTORY: &str = "XD:\\upload";

/// Generation named the way it is displayed.
#[derive(Debug, Clone, Copy)]
struct GenerationName(KitGeneration);

impl FromStr for GenerationName {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        [KitGeneration::Rel1411, KitGeneration::Rel1506]
            .into_iter()
            .find(|generation| generation.to_string() == text.trim_matches('"'))
            .map(Self)
            .ok_or_else(|| format!("unknown generation {text}"))
    }
}

struct TreeWorld {
    host: TempDir,
    device: Option<Arc<SimulatedDevice>>,
    console: Option<Console<SimulatedDevice>>,
    progress: Arc<Mutex<Vec<TransferMetric>>>,
    deleted: Option<DeleteSummary>,
    transferred: Option<TransferSummary>,
}

impl TreeWorld {
    fn console(&self) -> &Console<SimulatedDevice> {
        self.console.as_ref().expect("device should be set up")
    }

    fn device(&self) -> &SimulatedDevice {
        self.device.as_ref().expect("device should be set up")
    }

    fn host_path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.host.path().join(name)).expect("utf-8 temp path")
    }

    fn progress(&self) -> Vec<TransferMetric> {
        self.progress.lock().expect("progress lock").clone()
    }
}

#[fixture]
fn world() -> RefCell<TreeWorld> {
    RefCell::new(TreeWorld {
        host: TempDir::new().expect("temp dir"),
        device: None,
        console: None,
        progress: Arc::new(Mutex::new(Vec::new())),
        deleted: None,
        transferred: None,
    })
}

fn title(path: &str) -> RemotePath {
    RemotePath::new(path, OperatingTarget::Title).expect("valid path")
}

#[given("a {generation} device holding a populated data directory")]
fn given_populated_device(world: &RefCell<TreeWorld>, generation: GenerationName) {
    let GenerationName(generation) = generation;
    let device = Arc::new(SimulatedDevice::new(ManualClock::new()).with_generation(generation));
    for (path, size) in [
        ("XD:\\data\\one.bin", 100),
        ("XD:\\data\\first\\two.bin", 250),
        ("XD:\\data\\second\\three.bin", 50),
        ("XD:\\data\\second\\deep\\four.bin", 60),
    ] {
        device
            .add_file(path, OperatingTarget::Title, vec![0x5a_u8; size])
            .expect("valid file path");
    }
    device
        .add_directory("XD:\\data\\empty", OperatingTarget::Title)
        .expect("valid directory path");

    let mut world = world.borrow_mut();
    world.console = Some(simulated_console(&device, generation));
    world.device = Some(device);
}

#[when("the data directory is deleted recursively")]
fn when_deleted(world: &RefCell<TreeWorld>) {
    let summary = world
        .borrow()
        .console()
        .delete_directory(&title(DATA_DIRECTORY), true)
        .expect("delete succeeds");
    world.borrow_mut().deleted = Some(summary);
}

#[when("the data directory is received recursively")]
fn when_received(world: &RefCell<TreeWorld>) {
    let summary = {
        let world = world.borrow();
        let progress = Arc::clone(&world.progress);
        let sink = move |metric: &TransferMetric| {
            progress.lock().expect("progress lock").push(*metric);
        };
        world
            .console()
            .receive_directory(
                &title(DATA_DIRECTORY),
                &world.host_path("data"),
                true,
                Some(&sink),
            )
            .expect("receive succeeds")
    };
    world.borrow_mut().transferred = Some(summary);
}

#[when("a host tree is sent to the upload directory")]
fn when_sent(world: &RefCell<TreeWorld>) {
    let summary = {
        let world = world.borrow();
        let source = world.host_path("upload");
        fs::create_dir_all(source.join("nested")).expect("host dirs");
        fs::write(source.join("top.txt"), "top").expect("host file");
        fs::write(source.join("nested").join("inner.txt"), "inner").expect("host file");
        world
            .console()
            .send_directory(&source, &title(UPLOAD_DIRECTORY), true, None)
            .expect("send succeeds")
    };
    world.borrow_mut().transferred = Some(summary);
}

#[then("the data directory no longer exists")]
fn then_data_gone(world: &RefCell<TreeWorld>) {
    let world = world.borrow();
    assert!(!world.device().contains(&title(DATA_DIRECTORY)));
    assert!(
        !world
            .console()
            .directory_exists(&title(DATA_DIRECTORY))
            .expect("search succeeds")
    );
}

#[then("{count} files were deleted")]
fn then_files_deleted(world: &RefCell<TreeWorld>, count: usize) {
    let deleted = world.borrow().deleted.expect("delete should have run");
    assert_eq!(deleted.files_deleted, count);
}

#[then("progress never decreased")]
fn then_progress_monotonic(world: &RefCell<TreeWorld>) {
    let progress = world.borrow().progress();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| matches!(
        pair,
        [earlier, later] if earlier.total_bytes_transferred <= later.total_bytes_transferred
    )));
}

#[then("the final progress total is {bytes} bytes")]
fn then_final_total(world: &RefCell<TreeWorld>, bytes: u64) {
    let world = world.borrow();
    let progress = world.progress();
    let last = progress.last().expect("progress reported");
    assert_eq!(last.total_bytes_transferred, bytes);
    assert_eq!(last.total_bytes, bytes);
    assert_eq!(world.transferred.map(|summary| summary.bytes), Some(bytes));
}

#[then("the host holds {count} received files")]
fn then_host_files(world: &RefCell<TreeWorld>, count: usize) {
    let root = world.borrow().host_path("data");
    let files = WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count();
    assert_eq!(files, count);
}

#[then("the upload directory holds every sent file")]
fn then_upload_complete(world: &RefCell<TreeWorld>) {
    let world = world.borrow();
    assert_eq!(
        world
            .device()
            .file_contents(&title("XD:\\upload\\top.txt")),
        Some(b"top".to_vec())
    );
    assert_eq!(
        world
            .device()
            .file_contents(&title("XD:\\upload\\nested\\inner.txt")),
        Some(b"inner".to_vec())
    );
    assert_eq!(world.transferred.map(|summary| summary.files), Some(2));
}

#[scenario(
    path = "tests/features/remote_tree.feature",
    name = "Recursive delete on a generation that fails empty listings"
)]
fn recursive_delete(world: RefCell<TreeWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/remote_tree.feature",
    name = "Receiving a tree reports monotonic progress"
)]
fn receive_progress(world: RefCell<TreeWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/remote_tree.feature",
    name = "Receiving on a generation that honours recursion levels"
)]
fn receive_honouring_recursion(world: RefCell<TreeWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/remote_tree.feature",
    name = "Sending a host tree to the device"
)]
fn send_tree(world: RefCell<TreeWorld>) {
    let _ = world;
}
