//! Unified diff emission.
//!
//! Uses the `similar` crate (Myers diff algorithm) over newline-inclusive
//! lines, so a change in the presence of a final newline is a real change.
//! The output format is exactly what [`crate::apply`] consumes, and the two
//! satisfy `apply(old, diff(old, new)) == new` for all text inputs.

use similar::{ChangeTag, TextDiff};

use crate::apply::split_inclusive;

/// Context lines kept around each change block.
const CONTEXT: usize = 3;

/// Emit a unified diff transforming `old` into `new`.
///
/// Identical inputs produce an empty string. No file headers are emitted;
/// hunk headers carry explicit lengths on both ranges.
pub fn diff(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let old_lines = split_inclusive(old);
    let new_lines = split_inclusive(new);
    let text_diff = TextDiff::from_slices(&old_lines, &new_lines);

    let mut out = String::new();
    for group in text_diff.grouped_ops(CONTEXT) {
        let old_start = group.first().map_or(0, |op| op.old_range().start);
        let new_start = group.first().map_or(0, |op| op.new_range().start);
        let old_len: usize = group.iter().map(|op| op.old_range().len()).sum();
        let new_len: usize = group.iter().map(|op| op.new_range().len()).sum();

        out.push_str(&header(old_start, old_len, new_start, new_len));

        for op in &group {
            for change in text_diff.iter_changes(op) {
                let tag = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                let value: &str = change.value();
                out.push(tag);
                out.push_str(value.trim_end_matches('\n'));
                out.push('\n');
                if !value.ends_with('\n') {
                    out.push_str("\\ No newline at end of file\n");
                }
            }
        }
    }
    out
}

/// `@@ -old +new @@` with 1-based starts; a zero-length range reports the
/// line it follows instead.
fn header(old_start: usize, old_len: usize, new_start: usize, new_len: usize) -> String {
    let display = |start: usize, len: usize| {
        if len == 0 {
            start
        } else {
            start + 1
        }
    };
    format!(
        "@@ -{},{} +{},{} @@\n",
        display(old_start, old_len),
        old_len,
        display(new_start, new_len),
        new_len,
    )
}
