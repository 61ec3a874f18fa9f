//! Merge and windowing over bounded batches.

use shiftscope_types::LogEntry;

/// Concatenate batches and sort them into the canonical ascending order.
///
/// Text is the last tie-break, so the output does not depend on the order
/// batches arrived in.
pub fn merge(batches: impl IntoIterator<Item = Vec<LogEntry>>) -> Vec<LogEntry> {
    let mut merged: Vec<LogEntry> = batches.into_iter().flatten().collect();
    merged.sort_by(|a, b| a.cmp_order(b).then_with(|| a.text.cmp(&b.text)));
    merged
}

/// Keep the most recent `max_lines` entries of an ascending sequence.
/// Returns whether anything was dropped.
pub fn window(mut entries: Vec<LogEntry>, max_lines: usize) -> (Vec<LogEntry>, bool) {
    if entries.len() <= max_lines {
        return (entries, false);
    }
    let excess = entries.len() - max_lines;
    entries.drain(..excess);
    (entries, true)
}
