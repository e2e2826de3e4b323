//! Fuzzy diff application.
//!
//! Hunks are tried at their declared position first (adjusted by the drift
//! observed on earlier hunks). When the anchor lines no longer match there,
//! a bounded window around the expected position is searched before the
//! application fails with a diagnostic snippet.

use std::ops::Range;

use crate::error::{DiffError, DiffResult};
use crate::hunk::{parse, DiffOp, Hunk};
use crate::repair::{repair_smashed_line, SmashRepair};

/// Half-width of the relocation search window, in lines.
const SEARCH_WINDOW: usize = 60;

/// Number of leading context/removal lines used as relocation anchors.
const ANCHOR_LINES: usize = 3;

/// Radius of the diagnostic snippet carried on failures.
const SNIPPET_RADIUS: usize = 5;

/// The result of a successful application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// The produced text.
    pub text: String,
    /// Line ranges (0-based, in the produced text) that each hunk rewrote.
    pub modified_ranges: Vec<Range<usize>>,
}

/// Knobs for [`apply_with`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyOptions {
    /// Split smashed added lines back into two. Off by default: this is a
    /// retry pass for mangled patches, and it would rewrite legitimate
    /// content that merely resembles the pattern.
    pub repair_smashed: bool,
}

/// Apply unified-diff text to `original`, returning the new text and the
/// modified line ranges.
///
/// Context and removal lines are matched fuzzily: equality after trimming
/// leading and trailing whitespace. Declared header lengths are advisory;
/// disagreement with the ops actually present only logs a warning.
pub fn apply(original: &str, diff_text: &str) -> DiffResult<Applied> {
    apply_with(original, diff_text, ApplyOptions::default())
}

/// [`apply`] with explicit options.
pub fn apply_with(original: &str, diff_text: &str, options: ApplyOptions) -> DiffResult<Applied> {
    let hunks = parse(diff_text)?;
    apply_hunks(original, &hunks, options)
}

/// Apply already-parsed hunks. See [`apply`].
pub fn apply_hunks(original: &str, hunks: &[Hunk], options: ApplyOptions) -> DiffResult<Applied> {
    let src: Vec<&str> = split_inclusive(original);
    let mut out: Vec<String> = Vec::with_capacity(src.len());
    let mut modified = Vec::with_capacity(hunks.len());

    // Index into `src` of the next unconsumed line.
    let mut cursor = 0usize;
    // Observed drift between declared and actual hunk positions.
    let mut drift = 0isize;

    for (hunk_no, hunk) in hunks.iter().enumerate() {
        warn_on_header_mismatch(hunk_no, hunk);

        let declared = declared_position(hunk);
        let expected = clamp(declared as isize + drift, cursor, src.len());
        let pos = locate_hunk(&src, cursor, expected, hunk, hunk_no)?;
        if pos != expected {
            tracing::debug!(
                hunk = hunk_no,
                expected,
                actual = pos,
                "relocated hunk by fuzzy anchor search"
            );
        }

        // Copy the untouched span before the hunk.
        for line in &src[cursor..pos] {
            out.push((*line).to_string());
        }
        cursor = pos;

        let out_start = out.len();
        for op in &hunk.ops {
            match op {
                DiffOp::Context { text, .. } => {
                    check_line(&src, cursor, text, hunk_no)?;
                    out.push(src[cursor].to_string());
                    cursor += 1;
                }
                DiffOp::Remove { text, .. } => {
                    check_line(&src, cursor, text, hunk_no)?;
                    cursor += 1;
                }
                DiffOp::Add { text, newline } => {
                    push_added(&mut out, text, *newline, options.repair_smashed)
                }
            }
        }
        modified.push(out_start..out.len());

        drift = pos as isize - declared as isize;
    }

    // Copy the tail.
    for line in &src[cursor..] {
        out.push((*line).to_string());
    }

    Ok(Applied {
        text: out.concat(),
        modified_ranges: modified,
    })
}

/// The 0-based position a hunk header declares. A zero-length old range
/// addresses the gap *after* the given line, which in 0-based terms is the
/// line number itself.
fn declared_position(hunk: &Hunk) -> usize {
    if hunk.old_len == 0 {
        hunk.old_start
    } else {
        hunk.old_start.saturating_sub(1)
    }
}

fn clamp(value: isize, lo: usize, hi: usize) -> usize {
    (value.max(lo as isize) as usize).min(hi)
}

/// Fuzzy line equality: equal after trimming incidental whitespace.
fn fuzzy_eq(content_line: &str, op_text: &str) -> bool {
    content_line.trim() == op_text.trim()
}

/// Find the position where this hunk applies: the exact expected position
/// first, then the nearest position within ±[`SEARCH_WINDOW`] lines where
/// the first up-to-[`ANCHOR_LINES`] context/removal lines all match.
fn locate_hunk(
    src: &[&str],
    cursor: usize,
    expected: usize,
    hunk: &Hunk,
    hunk_no: usize,
) -> DiffResult<usize> {
    let anchors: Vec<&str> = hunk
        .ops
        .iter()
        .filter(|op| op.consumes_old())
        .take(ANCHOR_LINES)
        .map(|op| op.text())
        .collect();

    // Pure-addition hunk: nothing to anchor on, trust the position.
    if anchors.is_empty() {
        return Ok(expected);
    }

    let fits = |pos: usize| pos >= cursor && pos + anchors.len() <= src.len();
    let matches_at = |pos: usize| {
        anchors
            .iter()
            .enumerate()
            .all(|(k, anchor)| fuzzy_eq(src[pos + k], anchor))
    };

    if fits(expected) && matches_at(expected) {
        return Ok(expected);
    }

    for delta in 1..=SEARCH_WINDOW {
        if expected >= delta {
            let pos = expected - delta;
            if fits(pos) && matches_at(pos) {
                return Ok(pos);
            }
        }
        let pos = expected + delta;
        if fits(pos) && matches_at(pos) {
            return Ok(pos);
        }
    }

    Err(DiffError::HunkNotLocatable {
        hunk: hunk_no,
        expected_line: expected + 1,
        snippet: snippet(src, expected),
    })
}

/// Verify a context/removal line matches the content at `cursor`.
fn check_line(src: &[&str], cursor: usize, op_text: &str, hunk_no: usize) -> DiffResult<()> {
    let found = src.get(cursor).copied();
    if found.is_some_and(|line| fuzzy_eq(line, op_text)) {
        return Ok(());
    }
    Err(DiffError::ContextMismatch {
        hunk: hunk_no,
        line: cursor + 1,
        expected: op_text.to_string(),
        snippet: snippet(src, cursor),
    })
}

/// Insert an added line, optionally splitting smashed lines back into two.
fn push_added(out: &mut Vec<String>, text: &str, newline: bool, repair: bool) {
    let terminator = if newline { "\n" } else { "" };
    if !repair {
        out.push(format!("{text}{terminator}"));
        return;
    }
    match repair_smashed_line(text) {
        SmashRepair::Intact => out.push(format!("{text}{terminator}")),
        SmashRepair::Collapsed(line) => {
            tracing::warn!("collapsed duplicated smashed line: {line:?}");
            out.push(format!("{line}{terminator}"));
        }
        SmashRepair::Split(first, second) => {
            tracing::warn!("split smashed line into two: {first:?} / {second:?}");
            out.push(format!("{first}\n"));
            out.push(format!("{second}{terminator}"));
        }
    }
}

fn warn_on_header_mismatch(hunk_no: usize, hunk: &Hunk) {
    let consumed = hunk.consumed();
    let produced = hunk.produced();
    if consumed != hunk.old_len || produced != hunk.new_len {
        tracing::warn!(
            hunk = hunk_no,
            declared_old = hunk.old_len,
            actual_old = consumed,
            declared_new = hunk.new_len,
            actual_new = produced,
            "hunk header lengths disagree with body; trusting the body"
        );
    }
}

/// ±[`SNIPPET_RADIUS`] lines of content around `center`, for diagnostics.
fn snippet(src: &[&str], center: usize) -> String {
    let lo = center.saturating_sub(SNIPPET_RADIUS);
    let hi = (center + SNIPPET_RADIUS + 1).min(src.len());
    src[lo..hi]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>5} | {}", lo + i + 1, line.trim_end_matches('\n')))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into lines that keep their trailing newline (the last line
/// may lack one). Empty text has no lines.
pub fn split_inclusive(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split_inclusive('\n').collect()
    }
}
