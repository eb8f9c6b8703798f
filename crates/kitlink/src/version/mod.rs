//! Selection of the protocol implementation for the installed device kit.
//!
//! - `parse` reads the `W.X.Y.Z (branch.timestamp)` version grammar.
//! - `table` maps branches to build keys and build keys to generations.
//! - `install` locates the kit on the controlling host.
//! - `selection` caches the result once per process.

mod install;
mod parse;
mod selection;
mod table;

pub use install::{BIN_DIR, KitInstallation, TRANSPORT_EXECUTABLES, VERSION_FILE};
pub use parse::{KitVersion, VersionParseError};
pub use selection::{SelectionCell, process_selection, select_implementation};
pub use table::{
    BRANCH_TABLE, BuildKey, ImplementationRegistry, KitGeneration, KitImplementation,
    build_key_for_branch, resolve,
};
