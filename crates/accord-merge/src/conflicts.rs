//! Conflict region extraction and resolution application.

use accord_diff::split_inclusive;
use accord_types::{ConflictRegion, Resolution};

use crate::diff3::{MARKER_A, MARKER_B, MARKER_SEP};

/// Extract the conflict regions embedded in merged text, numbered 1-based
/// top-down. Option texts are the newline-terminated line blocks between the
/// markers, verbatim.
pub fn extract_regions(file_path: &str, text: &str) -> Vec<ConflictRegion> {
    enum State {
        Outside,
        InA(String),
        InB(String, String),
    }

    let mut regions = Vec::new();
    let mut state = State::Outside;

    for line in split_inclusive(text) {
        let bare = line.trim_end_matches('\n');
        state = match state {
            State::Outside if bare.starts_with(MARKER_A) => State::InA(String::new()),
            State::Outside => State::Outside,
            State::InA(a) if bare == MARKER_SEP => State::InB(a, String::new()),
            State::InA(mut a) => {
                a.push_str(line);
                State::InA(a)
            }
            State::InB(a, b) if bare.starts_with(MARKER_B) => {
                let num = regions.len() as u32 + 1;
                regions.push(ConflictRegion::new(file_path, num, a, b));
                State::Outside
            }
            State::InB(a, mut b) => {
                b.push_str(line);
                State::InB(a, b)
            }
        };
    }

    regions
}

/// Number of conflict regions in `text`.
pub fn conflict_count(text: &str) -> usize {
    extract_regions("", text).len()
}

/// Replace the `region.conflict_num`'th conflict block in `text` with the
/// materialized resolution. Returns `None` when no such region exists
/// (already consumed, or the text changed underneath).
pub fn apply_resolution(text: &str, region: &ConflictRegion, resolution: &Resolution) -> Option<String> {
    let replacement = materialized(region, resolution);
    let mut out: Vec<&str> = Vec::new();
    let mut replaced = false;
    let mut current = 0u32;
    let mut skipping = false;

    for line in split_inclusive(text) {
        let bare = line.trim_end_matches('\n');
        if !skipping && bare.starts_with(MARKER_A) {
            current += 1;
            if current == region.conflict_num {
                skipping = true;
                continue;
            }
        }
        if skipping {
            if bare.starts_with(MARKER_B) {
                skipping = false;
                out.push(&replacement);
                replaced = true;
            }
            continue;
        }
        out.push(line);
    }

    if replaced {
        Some(out.concat())
    } else {
        None
    }
}

/// The replacement text for a region, newline-terminated when non-empty.
fn materialized(region: &ConflictRegion, resolution: &Resolution) -> String {
    let text = resolution.materialize(region);
    if text.is_empty() || text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFLICTED: &str =
        "a\n<<<<<<< A\nB1\n=======\nB2\n>>>>>>> B\nc\n<<<<<<< A\nX\n=======\nY\n>>>>>>> B\nz\n";

    #[test]
    fn extracts_regions_in_order() {
        let regions = extract_regions("f.txt", CONFLICTED);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].conflict_num, 1);
        assert_eq!(regions[0].option_a, "B1\n");
        assert_eq!(regions[0].option_b, "B2\n");
        assert_eq!(regions[1].conflict_num, 2);
        assert_eq!(regions[1].option_a, "X\n");
        assert_eq!(regions[1].option_b, "Y\n");
    }

    #[test]
    fn no_markers_no_regions() {
        assert!(extract_regions("f", "plain\ntext\n").is_empty());
        assert_eq!(conflict_count("plain\n"), 0);
    }

    #[test]
    fn multiline_options() {
        let text = "<<<<<<< A\nl1\nl2\n=======\nr1\n>>>>>>> B\n";
        let regions = extract_regions("f", text);
        assert_eq!(regions[0].option_a, "l1\nl2\n");
        assert_eq!(regions[0].option_b, "r1\n");
    }

    #[test]
    fn empty_option_sides() {
        let text = "<<<<<<< A\n=======\nonly-b\n>>>>>>> B\n";
        let regions = extract_regions("f", text);
        assert_eq!(regions[0].option_a, "");
        assert_eq!(regions[0].option_b, "only-b\n");
    }

    #[test]
    fn resolve_take_a() {
        let regions = extract_regions("f", CONFLICTED);
        let resolved = apply_resolution(CONFLICTED, &regions[0], &Resolution::TakeA).unwrap();
        assert!(resolved.starts_with("a\nB1\nc\n"));
        // Second region untouched.
        assert_eq!(conflict_count(&resolved), 1);
    }

    #[test]
    fn resolve_take_b_second_region() {
        let regions = extract_regions("f", CONFLICTED);
        let resolved = apply_resolution(CONFLICTED, &regions[1], &Resolution::TakeB).unwrap();
        assert!(resolved.contains("c\nY\nz\n"));
        assert_eq!(conflict_count(&resolved), 1);
    }

    #[test]
    fn resolve_literal() {
        let regions = extract_regions("f", CONFLICTED);
        let res = Resolution::Literal("B3".into());
        let resolved = apply_resolution(CONFLICTED, &regions[0], &res).unwrap();
        assert!(resolved.starts_with("a\nB3\nc\n"));
    }

    #[test]
    fn resolve_highest_first_keeps_lower_offsets() {
        let regions = extract_regions("f", CONFLICTED);
        let after_second = apply_resolution(CONFLICTED, &regions[1], &Resolution::TakeA).unwrap();
        let after_both = apply_resolution(&after_second, &regions[0], &Resolution::TakeB).unwrap();
        assert_eq!(after_both, "a\nB2\nc\nX\nz\n");
        assert_eq!(conflict_count(&after_both), 0);
    }

    #[test]
    fn missing_region_returns_none() {
        let regions = extract_regions("f", CONFLICTED);
        let resolved = apply_resolution(CONFLICTED, &regions[0], &Resolution::TakeA).unwrap();
        // Region 2 is now region 1 of the remaining text; asking for its old
        // number 2 fails.
        assert!(apply_resolution(&resolved, &regions[1], &Resolution::TakeA).is_none());
    }
}
