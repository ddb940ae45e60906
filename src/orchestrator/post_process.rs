//! Post-run processing utilities.
//!
//! Handles exports after a run completes.

use crate::cli::Cli;
use crate::logbook::LogBook;
use crate::model::RunResult;
use anyhow::{Context, Result};
use std::path::Path;

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub(crate) struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub export_failed: bool,
}

pub(crate) fn export_json(path: &Path, result: &RunResult) -> Result<()> {
    let data = serde_json::to_vec_pretty(result)?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Process a completed run: write the requested result and log exports.
pub(crate) fn process_run_completion(args: &Cli, log: &LogBook, run: &RunResult) -> ProcessedRun {
    let mut processed = ProcessedRun::default();

    if let Some(export_path) = args.export_json.as_deref() {
        match export_json(export_path, run) {
            Ok(_) => processed
                .export_messages
                .push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => {
                processed.export_failed = true;
                processed
                    .export_messages
                    .push(format!("Export JSON failed: {e:#}"));
            }
        }
    }
    if let Some(export_path) = args.export_log.as_deref() {
        match log.export(export_path) {
            Ok(_) => processed
                .export_messages
                .push(format!("Exported log: {}", export_path.display())),
            Err(e) => {
                processed.export_failed = true;
                processed
                    .export_messages
                    .push(format!("Export log failed: {e:#}"));
            }
        }
    }

    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogLevel;
    use clap::Parser;
    use std::time::Duration;

    fn result() -> RunResult {
        RunResult {
            run_id: "abc".into(),
            timestamp_utc: "2026-01-01T00:00:00Z".into(),
            total_items: 3,
            processed_items: 3,
            failed_items: Vec::new(),
            aborted: false,
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn writes_requested_exports() {
        let dir = tempfile::TempDir::new().unwrap();
        let json_path = dir.path().join("result.json");
        let log_path = dir.path().join("run.log");
        let args = Cli::parse_from([
            "scene-batch",
            "--export-json",
            json_path.to_str().unwrap(),
            "--export-log",
            log_path.to_str().unwrap(),
        ]);
        let mut log = LogBook::default();
        log.record(LogLevel::Info, "Processing finished successfully.");

        let processed = process_run_completion(&args, &log, &result());

        assert!(!processed.export_failed);
        assert_eq!(processed.export_messages.len(), 2);
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(json["run_id"], "abc");
        assert_eq!(json["processed_items"], 3);
        assert!(std::fs::read_to_string(&log_path)
            .unwrap()
            .contains("Processing finished successfully."));
    }

    #[test]
    fn reports_failed_exports() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad = dir.path().join("missing-dir").join("result.json");
        let args = Cli::parse_from(["scene-batch", "--export-json", bad.to_str().unwrap()]);

        let processed = process_run_completion(&args, &LogBook::default(), &result());

        assert!(processed.export_failed);
        assert!(processed.export_messages[0].starts_with("Export JSON failed"));
    }
}
