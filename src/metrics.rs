use std::time::Duration;

/// Completion percentage in `0.0..=100.0`; an empty run counts as 0%.
pub fn percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed.min(total) as f64) / (total as f64) * 100.0
}

/// Estimate the time remaining from the average time per processed item.
pub fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed) as u32;
    let per_item = elapsed / processed as u32;
    Some(per_item * remaining)
}

/// Format a duration as `HH:MM:SS`, truncating sub-second precision.
pub fn format_hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
