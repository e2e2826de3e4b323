//! Smashed-line repair.
//!
//! Some diff producers occasionally lose a newline between two statements,
//! leaving one added line that is really two lines joined by the second
//! statement's former indentation: a long run of internal whitespace. The
//! apply step detects that pattern on single added lines and splits them
//! back apart.

/// Minimum width of the internal whitespace run that marks a smashed line.
const MIN_RUN: usize = 8;

/// Outcome of inspecting one added line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SmashRepair {
    /// Not a smashed line; insert verbatim.
    Intact,
    /// Two distinct statements; insert as two lines.
    Split(String, String),
    /// Both halves identical; insert once.
    Collapsed(String),
}

/// Inspect an added line for the smashed-line pattern.
///
/// The line is smashed when its longest *internal* whitespace run is at
/// least [`MIN_RUN`] columns wide with non-empty text on both sides. The
/// right half keeps the line's original leading indentation so both produced
/// lines sit at the same depth.
pub fn repair_smashed_line(line: &str) -> SmashRepair {
    let trimmed = line.trim_end();
    let indent_end = trimmed.len() - trimmed.trim_start().len();

    let Some((run_start, run_end)) = longest_internal_run(trimmed, indent_end) else {
        return SmashRepair::Intact;
    };

    let left = trimmed[..run_start].trim_end();
    let right = trimmed[run_end..].trim_end();
    if left.trim().is_empty() || right.is_empty() {
        return SmashRepair::Intact;
    }

    if left.trim() == right.trim() {
        return SmashRepair::Collapsed(left.to_string());
    }

    let indent = &trimmed[..indent_end];
    SmashRepair::Split(left.to_string(), format!("{indent}{right}"))
}

/// The longest whitespace run strictly after the leading indentation.
/// Returns byte offsets `(start, end)` when the run is wide enough.
fn longest_internal_run(line: &str, indent_end: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut run_start: Option<usize> = None;

    for (i, ch) in line.char_indices() {
        if i < indent_end {
            continue;
        }
        if ch == ' ' || ch == '\t' {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            if i - start >= MIN_RUN && best.map_or(true, |(s, e)| i - start > e - s) {
                best = Some((start, i));
            }
        }
    }
    // A trailing run is not internal.
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_line_intact() {
        assert_eq!(repair_smashed_line("let x = 1;"), SmashRepair::Intact);
    }

    #[test]
    fn short_gap_intact() {
        assert_eq!(repair_smashed_line("let x = 1;  let y = 2;"), SmashRepair::Intact);
    }

    #[test]
    fn long_gap_splits() {
        let repaired = repair_smashed_line("let x = 1;            let y = 2;");
        assert_eq!(
            repaired,
            SmashRepair::Split("let x = 1;".into(), "let y = 2;".into())
        );
    }

    #[test]
    fn split_preserves_indentation() {
        let repaired = repair_smashed_line("    a = 1            b = 2");
        assert_eq!(repaired, SmashRepair::Split("    a = 1".into(), "    b = 2".into()));
    }

    #[test]
    fn identical_halves_collapse() {
        let repaired = repair_smashed_line("x += 1            x += 1");
        assert_eq!(repaired, SmashRepair::Collapsed("x += 1".into()));
    }

    #[test]
    fn leading_indent_is_not_a_run() {
        // Twelve leading spaces are indentation, not a smash marker.
        assert_eq!(repair_smashed_line("            let x = 1;"), SmashRepair::Intact);
    }

    #[test]
    fn trailing_whitespace_is_not_a_run() {
        assert_eq!(repair_smashed_line("let x = 1;            "), SmashRepair::Intact);
    }

    #[test]
    fn tabs_count_toward_run() {
        let repaired = repair_smashed_line("a = 1\t\t\t\t\t\t\t\tb = 2");
        assert_eq!(repaired, SmashRepair::Split("a = 1".into(), "b = 2".into()));
    }
}
