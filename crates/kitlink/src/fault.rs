//! Classification of native faults raised while a device reboots.
//!
//! A rebooting device surfaces two different low-level faults at different
//! points of its reboot sequence: first a shutdown-in-progress status code,
//! later an RPC-unavailable message. Only that ordered pair means "the device
//! is rebooting"; either fault on its own, out of order, is a genuine failure.
//! [`RebootSignals`] tracks how far through the pair a session has seen and
//! converts the recognised faults into [`DeviceError::CannotConnect`].

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::address::DeviceAddress;
use crate::error::DeviceError;
use crate::facade::{NativeFault, NativeResult, codes};

/// Tracing target for fault classification.
const FAULT_TARGET: &str = "kitlink::fault";

/// Status code that marks the first step of a reboot.
pub const FIRST_REBOOT_SIGNAL_CODE: u32 = codes::SHUTDOWN_IN_PROGRESS;

/// Message fragment that marks the second step of a reboot.
pub const SECOND_REBOOT_SIGNAL_TEXT: &str = "RPC server is unavailable";

/// Progress through the two-step reboot fault sequence of one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RebootSignals {
    saw_first: bool,
    saw_second: bool,
}

impl RebootSignals {
    /// Whether the first reboot fault has been seen.
    #[must_use]
    pub const fn saw_first(self) -> bool {
        self.saw_first
    }

    /// Whether the second reboot fault has been seen after the first.
    #[must_use]
    pub const fn saw_second(self) -> bool {
        self.saw_second
    }

    /// Classifies the outcome of one facade call.
    ///
    /// A success after both signals clears the state. The first-signal code is
    /// always a reboot; the second-signal message is a reboot only once the
    /// first has been seen. Every other fault passes through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::CannotConnect`] for recognised reboot faults and
    /// [`DeviceError::Native`] for everything else.
    pub fn classify<T>(
        &mut self,
        outcome: NativeResult<T>,
        address: &DeviceAddress,
    ) -> Result<T, DeviceError> {
        match outcome {
            Ok(value) => {
                if self.saw_first && self.saw_second {
                    debug!(target: FAULT_TARGET, %address, "reboot cycle complete; clearing signals");
                    *self = Self::default();
                }
                Ok(value)
            }
            Err(fault) => Err(self.classify_fault(fault, address)),
        }
    }

    fn classify_fault(&mut self, fault: NativeFault, address: &DeviceAddress) -> DeviceError {
        if fault.code() == FIRST_REBOOT_SIGNAL_CODE {
            if self.saw_second {
                // A fresh first signal after a completed pair starts a new cycle.
                debug!(target: FAULT_TARGET, %address, "first reboot signal restarted the cycle");
                self.saw_second = false;
            }
            self.saw_first = true;
            debug!(target: FAULT_TARGET, %address, code = fault.code(), "first reboot signal");
            return DeviceError::CannotConnect {
                address: address.clone(),
            };
        }
        if self.saw_first && fault.message().contains(SECOND_REBOOT_SIGNAL_TEXT) {
            self.saw_second = true;
            debug!(target: FAULT_TARGET, %address, "second reboot signal");
            return DeviceError::CannotConnect {
                address: address.clone(),
            };
        }
        DeviceError::Native(fault)
    }
}

/// Facade calls bound to an address and classified through session state.
///
/// The signal lock is held only while classifying, never across the remote
/// call itself.
pub struct Guarded<'a, F: ?Sized> {
    facade: &'a F,
    address: &'a DeviceAddress,
    signals: &'a Mutex<RebootSignals>,
}

impl<'a, F: ?Sized> Guarded<'a, F> {
    /// Binds `facade` to `address`, classifying faults into `signals`.
    #[must_use]
    pub const fn new(
        facade: &'a F,
        address: &'a DeviceAddress,
        signals: &'a Mutex<RebootSignals>,
    ) -> Self {
        Self {
            facade,
            address,
            signals,
        }
    }

    /// Address every call is routed to.
    #[must_use]
    pub const fn address(&self) -> &'a DeviceAddress {
        self.address
    }

    /// Invokes `call` and classifies its outcome.
    ///
    /// # Errors
    ///
    /// Returns the classified fault when `call` fails.
    pub fn call<T>(
        &self,
        call: impl FnOnce(&F, &DeviceAddress) -> NativeResult<T>,
    ) -> Result<T, DeviceError> {
        let outcome = call(self.facade, self.address);
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .classify(outcome, self.address)
    }
}
