//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode from a finished run.

use crate::model::{FailureKind, RunResult};
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn status(result: &RunResult) -> &'static str {
    if result.aborted {
        "aborted"
    } else if result.succeeded() {
        "completed"
    } else {
        "completed with errors"
    }
}

/// Build a text summary from a finished run.
pub(crate) fn build_text_summary(result: &RunResult) -> TextSummary {
    let mut lines = Vec::new();

    // Drop sub-millisecond noise.
    let elapsed = Duration::from_millis(result.elapsed.as_millis() as u64);
    lines.push(format!(
        "Run {}: {} in {}",
        result.run_id,
        status(result),
        humantime::format_duration(elapsed)
    ));
    lines.push(format!(
        "Items: {}/{} processed, {} failed",
        result.processed_items,
        result.total_items,
        result.failed_items.len()
    ));
    if result.aborted {
        lines.push(format!("Not processed: {}", result.remaining_items()));
    }

    if !result.failed_items.is_empty() {
        for kind in [FailureKind::Load, FailureKind::Script, FailureKind::Save] {
            let n = result.failed_items.iter().filter(|f| f.kind == kind).count();
            if n > 0 {
                lines.push(format!("  {kind}: {n}"));
            }
        }
        lines.push("Failures:".to_string());
        for f in &result.failed_items {
            lines.push(format!(
                "  #{} {} on {}: {}",
                f.index + 1,
                f.item.script.display(),
                f.item.scene.display(),
                f.message
            ));
        }
    }

    TextSummary { lines }
}
