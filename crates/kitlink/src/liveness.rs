//! Liveness probing of a device.
//!
//! A device can stop answering protocol calls while its network stack still
//! replies, and the reverse happens later in a boot. Liveness therefore
//! combines a network-layer reachability probe with a protocol-layer connect
//! attempt made through the device facade.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use crate::address::DeviceAddress;
use crate::error::DeviceError;

/// Tracing target for liveness probes.
const LIVENESS_TARGET: &str = "kitlink::liveness";

/// Default timeout of the network-layer probe.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Default port answered by the device's remote-control service.
pub const DEFAULT_PING_PORT: u16 = 11_442;

/// Network-layer reachability check.
pub trait NetworkProbe: Send + Sync {
    /// Returns `true` when the host answers at the network layer.
    fn is_reachable(&self, address: &DeviceAddress) -> bool;
}

/// Parameters of the network-layer probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    /// TCP port probed on the device.
    pub ping_port: u16,
    /// Time allowed for the probe to complete.
    pub ping_timeout: Duration,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            ping_port: DEFAULT_PING_PORT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Reachability probe that opens a TCP connection with a short timeout.
///
/// Any answer from the host counts, including a refused connection: a reset
/// proves the network stack is up even when no service is listening.
#[derive(Debug, Clone, Copy)]
pub struct TcpPing {
    port: u16,
    timeout: Duration,
}

impl TcpPing {
    /// Builds a probe from liveness settings.
    #[must_use]
    pub const fn new(settings: LivenessSettings) -> Self {
        Self {
            port: settings.ping_port,
            timeout: settings.ping_timeout,
        }
    }

    fn connect(&self, host: &str) -> io::Result<()> {
        let address = resolve(host, self.port)?;
        let domain = Domain::for_address(address);
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&SockAddr::from(address), self.timeout)
    }
}

impl NetworkProbe for TcpPing {
    fn is_reachable(&self, address: &DeviceAddress) -> bool {
        match self.connect(address.host()) {
            Ok(()) => true,
            Err(error) if error.kind() == io::ErrorKind::ConnectionRefused => true,
            Err(error) => {
                debug!(target: LIVENESS_TARGET, %address, %error, "network probe failed");
                false
            }
        }
    }
}

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

/// Combines the network probe with a protocol-level connect attempt.
#[derive(Clone)]
pub struct LivenessProber {
    network: Arc<dyn NetworkProbe>,
}

impl LivenessProber {
    /// Uses `network` for the network-layer half of every check.
    #[must_use]
    pub const fn new(network: Arc<dyn NetworkProbe>) -> Self {
        Self { network }
    }

    /// Returns `true` only when both the network probe and `connect` fail.
    ///
    /// `connect` is not attempted when the network probe succeeds. Any error
    /// from `connect`, including a reboot fault, counts as a failed connect.
    #[must_use]
    pub fn is_unresponsive(
        &self,
        address: &DeviceAddress,
        connect: impl FnOnce() -> Result<bool, DeviceError>,
    ) -> bool {
        if self.network.is_reachable(address) {
            debug!(target: LIVENESS_TARGET, %address, "network probe answered");
            return false;
        }
        match connect() {
            Ok(true) => false,
            Ok(false) => true,
            Err(error) => {
                debug!(target: LIVENESS_TARGET, %address, %error, "connect probe failed");
                true
            }
        }
    }

    /// Returns `true` when the network probe and `connect` both succeed.
    #[must_use]
    pub fn is_responsive(
        &self,
        address: &DeviceAddress,
        connect: impl FnOnce() -> Result<bool, DeviceError>,
    ) -> bool {
        self.network.is_reachable(address) && matches!(connect(), Ok(true))
    }
}

impl std::fmt::Debug for LivenessProber {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("LivenessProber").finish_non_exhaustive()
    }
}
