//! Error taxonomy for batch runs.
//!
//! Per-item errors (`LoadError`, `ScriptError`, `SaveError`) are produced by host adapters and
//! never escape the controller; they are turned into log entries and `FailedItem` records.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("scene file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read scene {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scene {} is not a valid scene document: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("script file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read script {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in {}: {reason}", path.display())]
    Syntax { path: PathBuf, reason: String },

    #[error("runtime error in {}: {reason}", path.display())]
    Runtime { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("no scene is loaded")]
    NoSceneLoaded,

    #[error("failed to encode scene for {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("failed to write scene {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Returned when `run` is entered on a controller that is already running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("a batch run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("script or scene file lists are empty")]
    Empty,

    #[error("script and scene lists differ in length ({scripts} scripts, {scenes} scenes)")]
    LengthMismatch { scripts: usize, scenes: usize },
}
