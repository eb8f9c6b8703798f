//! Remote control of development-kit consoles.
//!
//! Kitlink drives a device through an opaque native transport, modelled as
//! the [`DeviceFacade`] trait, and adds the behaviour that transport lacks:
//!
//! - reboot and shutdown as bounded two-phase waits, inferred from liveness
//!   because the transport has no "wait until rebooted" primitive;
//! - recognition of the ordered fault pair a rebooting device raises, which
//!   becomes [`DeviceError::CannotConnect`] instead of a raw fault;
//! - recursive copy and delete decomposed into single-level primitive calls,
//!   with per-file progress folded into one monotonic whole-tree sequence;
//! - selection, once per process, of the implementation matching the
//!   installed kit's version.
//!
//! A [`Console`] ties these together for one device. Timing is read through
//! the [`Clock`] trait so every wait can be driven by a manual clock in tests.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kitlink::{Console, DeviceAddress, DeviceFacade, TimeoutBudget};
//! use kitlink_config::Config;
//!
//! fn reboot_device<F: DeviceFacade>(facade: Arc<F>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let console = Console::connect(DeviceAddress::new("10.0.0.7"), facade, &config)?;
//!     console.reboot(TimeoutBudget::Infinite)?;
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod budget;
pub mod clock;
pub mod error;
pub mod facade;
pub mod fault;
pub mod lifecycle;
pub mod liveness;
pub mod path;
pub mod progress;
pub mod retry;
pub mod session;
pub mod telemetry;
pub mod transfer;
pub mod tree;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use address::DeviceAddress;
pub use budget::TimeoutBudget;
pub use clock::{Clock, SystemClock};
pub use error::{DeviceError, ResolveError};
pub use facade::{
    CopyLocation, CopyRequest, DeviceFacade, FileTransferProgress, NativeFault, NativeResult,
    ProcessInfo, RecursionLevel, RemoteFileInfo, SearchPattern,
};
pub use fault::RebootSignals;
pub use lifecycle::{LifecycleOperation, LifecycleReport, TimeoutReason};
pub use liveness::{LivenessSettings, NetworkProbe, TcpPing};
pub use path::{OperatingTarget, PathError, RemotePath};
pub use progress::{ProgressSink, TransferMetric};
pub use retry::RetryPolicy;
pub use session::{Console, RuntimeSettings};
pub use transfer::{CancellationToken, TransferHandle};
pub use tree::{DeleteSummary, TransferSummary};
pub use version::{KitGeneration, KitImplementation, KitVersion};

#[cfg(test)]
mod tests;
