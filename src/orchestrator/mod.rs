//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (start/abort/quit) and post-run processing
//! such as result and log exports. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, HostFactory, UiCommand};
pub(crate) use post_process::{export_json, process_run_completion};
