//! Host application adapters.
//!
//! The controller only talks to a host through [`HostAdapter`]. Calls are blocking and are
//! never made concurrently; an adapter does not need to be thread-safe.

#[cfg(test)]
pub(crate) mod mock;
mod rhai_host;

pub use rhai_host::{RhaiHost, RhaiHostConfig};

use crate::engine::AbortSignal;
use crate::error::{LoadError, SaveError, ScriptError};
use std::path::Path;

/// Name under which the abort flag is visible to scripts.
///
/// Scripts are expected to call `abort_requested()` at their start and inside long loops and
/// return early when it is true.
pub const ABORT_FLAG_NAME: &str = "abort_requested";

pub trait HostAdapter {
    /// Load `path` as the current scene, replacing any previously loaded one.
    fn load_scene(&mut self, path: &Path) -> Result<(), LoadError>;

    /// Run the script at `path` against the current scene. `abort` must be reachable from the
    /// script under [`ABORT_FLAG_NAME`].
    fn execute_script(&mut self, path: &Path, abort: &AbortSignal) -> Result<(), ScriptError>;

    /// Persist the current scene to `path`.
    fn save_scene(&mut self, path: &Path) -> Result<(), SaveError>;
}
