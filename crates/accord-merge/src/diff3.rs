//! Three-way line merge (classic diff3).
//!
//! Both divergent versions are diffed against the common base; the resulting
//! change blocks are walked in base order. Blocks touching disjoint base
//! ranges auto-merge. Blocks touching overlapping ranges merge silently when
//! both sides produced identical text, and otherwise become a conflict
//! region delimited with `<<<<<<< A` / `=======` / `>>>>>>> B` markers.

use accord_diff::split_inclusive;
use similar::{DiffTag, TextDiff};

pub const MARKER_A: &str = "<<<<<<< A";
pub const MARKER_SEP: &str = "=======";
pub const MARKER_B: &str = ">>>>>>> B";

/// The result of a three-way line merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Merged {
    pub text: String,
    /// Number of conflict regions embedded in `text`.
    pub conflicts: usize,
}

impl Merged {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }
}

/// A contiguous changed span: base lines `[base_start, base_end)` were
/// replaced by side lines `[side_start, side_end)`.
#[derive(Clone, Copy, Debug)]
struct Block {
    base_start: usize,
    base_end: usize,
    side_start: usize,
    side_end: usize,
}

/// Merge two versions of a text against their common base.
pub fn merge_lines(base: &str, a: &str, b: &str) -> Merged {
    if base.is_empty() {
        return merge_fresh(a, b);
    }
    if a == b {
        return Merged { text: a.to_string(), conflicts: 0 };
    }

    let base_lines = split_inclusive(base);
    let a_lines = split_inclusive(a);
    let b_lines = split_inclusive(b);

    let blocks_a = change_blocks(&base_lines, &a_lines);
    let blocks_b = change_blocks(&base_lines, &b_lines);

    let mut out: Vec<String> = Vec::new();
    let mut conflicts = 0usize;
    let mut base_pos = 0usize;
    let (mut i, mut j) = (0usize, 0usize);

    loop {
        match (blocks_a.get(i).copied(), blocks_b.get(j).copied()) {
            (None, None) => break,
            (Some(x), None) => {
                emit_one_side(&mut out, &base_lines, &a_lines, &mut base_pos, &x);
                i += 1;
            }
            (None, Some(y)) => {
                emit_one_side(&mut out, &base_lines, &b_lines, &mut base_pos, &y);
                j += 1;
            }
            (Some(x), Some(y)) => {
                if !overlaps(&x, &y) {
                    if (x.base_start, x.base_end) <= (y.base_start, y.base_end) {
                        emit_one_side(&mut out, &base_lines, &a_lines, &mut base_pos, &x);
                        i += 1;
                    } else {
                        emit_one_side(&mut out, &base_lines, &b_lines, &mut base_pos, &y);
                        j += 1;
                    }
                    continue;
                }

                // Combined region: absorb every further block that still
                // overlaps the growing base range.
                let mut lo = x.base_start.min(y.base_start);
                let mut hi = x.base_end.max(y.base_end);
                let (ai0, bi0) = (i, j);
                i += 1;
                j += 1;
                loop {
                    let mut grown = false;
                    if let Some(next) = blocks_a.get(i) {
                        if next.base_start < hi {
                            hi = hi.max(next.base_end);
                            lo = lo.min(next.base_start);
                            i += 1;
                            grown = true;
                        }
                    }
                    if let Some(next) = blocks_b.get(j) {
                        if next.base_start < hi {
                            hi = hi.max(next.base_end);
                            lo = lo.min(next.base_start);
                            j += 1;
                            grown = true;
                        }
                    }
                    if !grown {
                        break;
                    }
                }

                let a_span = side_span(&blocks_a[ai0..i], lo, hi);
                let b_span = side_span(&blocks_b[bi0..j], lo, hi);
                let a_text = &a_lines[a_span.0..a_span.1];
                let b_text = &b_lines[b_span.0..b_span.1];

                copy_base(&mut out, &base_lines, base_pos, lo);
                base_pos = hi;

                if a_text == b_text {
                    // Both sides made the same change.
                    push_lines(&mut out, a_text);
                } else {
                    push_conflict(&mut out, a_text, b_text);
                    conflicts += 1;
                }
            }
        }
    }

    copy_base(&mut out, &base_lines, base_pos, base_lines.len());

    Merged { text: out.concat(), conflicts }
}

/// New-file merge: both versions grew from an empty base.
fn merge_fresh(a: &str, b: &str) -> Merged {
    if a == b {
        return Merged { text: a.to_string(), conflicts: 0 };
    }
    if a.is_empty() {
        return Merged { text: b.to_string(), conflicts: 0 };
    }
    if b.is_empty() {
        return Merged { text: a.to_string(), conflicts: 0 };
    }
    let mut out = Vec::new();
    push_conflict(&mut out, &split_inclusive(a), &split_inclusive(b));
    Merged { text: out.concat(), conflicts: 1 }
}

/// Changed spans of one side against the base, coalescing adjacent
/// non-equal ops.
fn change_blocks(base: &[&str], side: &[&str]) -> Vec<Block> {
    let diff = TextDiff::from_slices(base, side);
    let mut blocks: Vec<Block> = Vec::new();

    for op in diff.ops() {
        if op.tag() == DiffTag::Equal {
            continue;
        }
        let old = op.old_range();
        let new = op.new_range();
        if let Some(last) = blocks.last_mut() {
            if last.base_end == old.start && last.side_end == new.start {
                last.base_end = old.end;
                last.side_end = new.end;
                continue;
            }
        }
        blocks.push(Block {
            base_start: old.start,
            base_end: old.end,
            side_start: new.start,
            side_end: new.end,
        });
    }
    blocks
}

/// Two blocks overlap when their base ranges intersect, or when both are
/// insertions at the same base position.
fn overlaps(x: &Block, y: &Block) -> bool {
    let strict = x.base_start < y.base_end && y.base_start < x.base_end;
    let both_inserts_same_spot = x.base_start == x.base_end
        && y.base_start == y.base_end
        && x.base_start == y.base_start;
    strict || both_inserts_same_spot
}

/// Map the combined base range `[lo, hi)` onto one side's line range, using
/// that side's blocks inside the region. Lines outside any block are common
/// with the base, so the edges map 1:1 by offset.
fn side_span(blocks: &[Block], lo: usize, hi: usize) -> (usize, usize) {
    match (blocks.first(), blocks.last()) {
        (Some(first), Some(last)) => {
            let start = first.side_start - (first.base_start - lo);
            let end = last.side_end + (hi - last.base_end);
            (start, end)
        }
        // No block of this side participates: the side equals the base over
        // the whole region; its span has the same width.
        _ => unreachable!("combined region always includes blocks from both sides"),
    }
}

fn copy_base(out: &mut Vec<String>, base_lines: &[&str], from: usize, to: usize) {
    for line in &base_lines[from..to] {
        out.push((*line).to_string());
    }
}

fn push_lines(out: &mut Vec<String>, lines: &[&str]) {
    for line in lines {
        out.push((*line).to_string());
    }
}

/// Push lines and guarantee the last one ends with a newline, so a following
/// marker starts its own line.
fn push_terminated(out: &mut Vec<String>, lines: &[&str]) {
    for (idx, line) in lines.iter().enumerate() {
        if idx + 1 == lines.len() && !line.ends_with('\n') {
            out.push(format!("{line}\n"));
        } else {
            out.push((*line).to_string());
        }
    }
}

fn push_conflict(out: &mut Vec<String>, a_text: &[&str], b_text: &[&str]) {
    out.push(format!("{MARKER_A}\n"));
    push_terminated(out, a_text);
    out.push(format!("{MARKER_SEP}\n"));
    push_terminated(out, b_text);
    out.push(format!("{MARKER_B}\n"));
}

/// Apply one block of a single side: copy untouched base, then the side's
/// replacement lines.
fn emit_one_side(
    out: &mut Vec<String>,
    base_lines: &[&str],
    side_lines: &[&str],
    base_pos: &mut usize,
    block: &Block,
) {
    copy_base(out, base_lines, *base_pos, block.base_start);
    push_lines(out, &side_lines[block.side_start..block.side_end]);
    *base_pos = block.base_end;
}
