//! Process-wide, once-initialised implementation selection.
//!
//! Several sessions may start concurrently, but the installed kit is resolved
//! once: the first caller runs the selection under the write lock and every
//! later caller gets the cached handle from the read lock. [`SelectionCell::reset`]
//! is the teardown half of the contract, used when the host installation
//! changes under a long-running process.

use std::sync::{Arc, PoisonError, RwLock};

use camino::Utf8Path;
use tracing::info;

use super::install::KitInstallation;
use super::table::{ImplementationRegistry, KitImplementation, resolve};
use crate::error::ResolveError;

/// Tracing target for implementation selection.
const SELECTION_TARGET: &str = "kitlink::version::selection";

/// Lock-guarded slot holding the selected implementation.
#[derive(Debug, Default)]
pub struct SelectionCell {
    slot: RwLock<Option<Arc<KitImplementation>>>,
}

impl SelectionCell {
    /// Creates an empty cell.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Returns the cached implementation, running `select` if there is none.
    ///
    /// `select` runs at most once across all threads until the cell is
    /// reset. A failed selection leaves the cell empty.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `select`.
    pub fn get_or_select<F>(&self, select: F) -> Result<Arc<KitImplementation>, ResolveError>
    where
        F: FnOnce() -> Result<KitImplementation, ResolveError>,
    {
        if let Some(selected) = self.current() {
            return Ok(selected);
        }
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(selected) = slot.as_ref() {
            return Ok(Arc::clone(selected));
        }
        let selected = Arc::new(select()?);
        info!(
            target: SELECTION_TARGET,
            version = %selected.version,
            build = %selected.build,
            generation = %selected.generation,
            "kit implementation selected"
        );
        *slot = Some(Arc::clone(&selected));
        Ok(selected)
    }

    /// The cached implementation, if selection has run.
    #[must_use]
    pub fn current(&self) -> Option<Arc<KitImplementation>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Empties the cell, returning what it held.
    #[must_use = "the previous selection is returned for inspection"]
    pub fn reset(&self) -> Option<Arc<KitImplementation>> {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

static PROCESS_SELECTION: SelectionCell = SelectionCell::new();

/// The cell shared by every session in this process.
#[must_use]
pub fn process_selection() -> &'static SelectionCell {
    &PROCESS_SELECTION
}

/// Selects the implementation for the kit installed under `kit_root`, once
/// per process.
///
/// # Errors
///
/// Returns a [`ResolveError`] when the installation is missing, its version
/// stamp is unreadable or malformed, or its build has no implementation.
pub fn select_implementation(kit_root: &Utf8Path) -> Result<Arc<KitImplementation>, ResolveError> {
    PROCESS_SELECTION.get_or_select(|| {
        let installation = KitInstallation::discover(kit_root)?;
        let version = installation.read_version()?;
        resolve(&version, &ImplementationRegistry::builtin())
    })
}
