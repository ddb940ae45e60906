//! Session log shown to the user.
//!
//! Entries are only ever appended; the whole book can be cleared by an explicit user action.

use crate::model::{LogEntry, LogLevel};
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct LogBook {
    entries: Vec<LogEntry>,
}

impl LogBook {
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Append a message stamped with the current time.
    pub fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        self.push(LogEntry::new(level, message));
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    /// All entries as plain text, one per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&e.to_line());
            out.push('\n');
        }
        out
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text())
            .with_context(|| format!("write log to {}", path.display()))
    }
}
