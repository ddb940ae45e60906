use crate::queue::Pairing;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use time::UtcOffset;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub scripts: Vec<PathBuf>,
    pub scenes: Vec<PathBuf>,
    pub save_after: bool,
    pub pairing: Pairing,
    /// Operations budget handed to the script engine; 0 disables the limit.
    pub max_operations: u64,
    #[serde(with = "humantime_serde")]
    pub abort_grace: Duration,
}

/// One (script, scene, save-flag) unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub script: PathBuf,
    pub scene: PathBuf,
    pub save_after: bool,
    /// The previous item targets the same scene; skip the load if it is still loaded.
    #[serde(default)]
    pub reuse_scene: bool,
}

impl WorkItem {
    pub fn new(script: impl Into<PathBuf>, scene: impl Into<PathBuf>, save_after: bool) -> Self {
        Self {
            script: script.into(),
            scene: scene.into(),
            save_after,
            reuse_scene: false,
        }
    }
}

/// Ordered, immutable sequence of work items for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
}

impl WorkQueue {
    pub(crate) fn from_items(items: Vec<WorkItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkItem> {
        self.items.iter()
    }

    /// Number of distinct scene paths, in the order they first appear.
    pub fn scene_count(&self) -> usize {
        count_distinct(self.items.iter().map(|i| i.scene.as_path()))
    }

    pub fn script_count(&self) -> usize {
        count_distinct(self.items.iter().map(|i| i.script.as_path()))
    }
}

fn count_distinct<'a>(paths: impl Iterator<Item = &'a Path>) -> usize {
    let mut seen: Vec<&Path> = Vec::new();
    for p in paths {
        if !seen.contains(&p) {
            seen.push(p);
        }
    }
    seen.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Aborting,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Running | RunState::Aborting)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Aborting => "Aborting",
            RunState::Completed => "Completed",
            RunState::Aborted => "Aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Loading,
    Running,
    Saving,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Loading => "LOADING",
            LogLevel::Running => "RUNNING",
            LogLevel::Saving => "SAVING",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: clock_timestamp(),
            level,
            message: message.into(),
        }
    }

    /// Render as a single plain-text line, e.g. for clipboard copy or export.
    pub fn to_line(&self) -> String {
        format!("[{}] {:<7} {}", self.timestamp, self.level.as_str(), self.message)
    }
}

/// Capture the local UTC offset for log timestamps.
///
/// `time` refuses to read the offset once the process has several threads (on Unix), so this
/// must run before the async runtime starts. Without it timestamps fall back to UTC.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

fn clock_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc().to_offset(local_offset());
    now.format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".into())
}

pub fn utc_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    #[serde(with = "humantime_serde")]
    pub eta: Option<Duration>,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        crate::metrics::percent(self.processed, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Load,
    Script,
    Save,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Load => "LoadError",
            FailureKind::Script => "ScriptError",
            FailureKind::Save => "SaveError",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Zero-based position of the item in its queue.
    pub index: usize,
    pub item: WorkItem,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    #[serde(default)]
    pub timestamp_utc: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: Vec<FailedItem>,
    pub aborted: bool,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl RunResult {
    pub fn remaining_items(&self) -> usize {
        self.total_items.saturating_sub(self.processed_items)
    }

    pub fn succeeded(&self) -> bool {
        !self.aborted && self.failed_items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BatchEvent {
    StateChanged {
        state: RunState,
    },
    Log(LogEntry),
    Progress(Progress),
    RunCompleted {
        // Boxed so the per-item events stay small.
        result: Box<RunResult>,
    },
}
