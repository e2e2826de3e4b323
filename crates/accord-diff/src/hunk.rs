//! Unified-diff parsing: diff text into ordered hunks.

use crate::error::{DiffError, DiffResult};

/// A single operation within a hunk.
///
/// `newline` records whether the line carries a trailing newline in its
/// file. It is `false` only for a final line followed by the
/// `\ No newline at end of file` marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffOp {
    /// A line present in both versions. Must fuzzy-match on application.
    Context { text: String, newline: bool },
    /// A line added in the new version. Inserted verbatim.
    Add { text: String, newline: bool },
    /// A line removed from the old version. Must fuzzy-match and is dropped.
    Remove { text: String, newline: bool },
}

impl DiffOp {
    /// The line text, without any newline.
    pub fn text(&self) -> &str {
        match self {
            Self::Context { text, .. } | Self::Add { text, .. } | Self::Remove { text, .. } => text,
        }
    }

    /// Returns `true` for context and removal ops, the ones that consume a
    /// line of the old content.
    pub fn consumes_old(&self) -> bool {
        matches!(self, Self::Context { .. } | Self::Remove { .. })
    }
}

/// One contiguous change block within a unified diff.
///
/// Header positions are 1-based original-file coordinates. The length
/// fields are advisory only: application trusts the ops actually present
/// and merely warns when the counts disagree with the header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub ops: Vec<DiffOp>,
}

impl Hunk {
    /// Lines of old content this hunk actually consumes.
    pub fn consumed(&self) -> usize {
        self.ops.iter().filter(|op| op.consumes_old()).count()
    }

    /// Lines of new content this hunk actually produces.
    pub fn produced(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DiffOp::Context { .. } | DiffOp::Add { .. }))
            .count()
    }
}

/// Parse unified diff text into ordered hunks.
///
/// Everything before the first `@@` header (file headers, comments) is
/// ignored. A missing length in a header defaults to 1.
pub fn parse(diff_text: &str) -> DiffResult<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for (idx, line) in diff_text.lines().enumerate() {
        let line_no = idx + 1;

        if line.starts_with("@@") {
            let (old_start, old_len, new_start, new_len) = parse_header(line, line_no)?;
            hunks.push(Hunk {
                old_start,
                old_len,
                new_start,
                new_len,
                ops: Vec::new(),
            });
            continue;
        }

        let Some(hunk) = hunks.last_mut() else {
            // Preamble before the first hunk header.
            continue;
        };

        if line.starts_with('\\') {
            // "\ No newline at end of file" applies to the preceding op.
            match hunk.ops.last_mut() {
                Some(
                    DiffOp::Context { newline, .. }
                    | DiffOp::Add { newline, .. }
                    | DiffOp::Remove { newline, .. },
                ) => *newline = false,
                None => {
                    return Err(DiffError::Parse {
                        line: line_no,
                        message: "newline marker before any diff line".into(),
                    })
                }
            }
            continue;
        }

        let mut chars = line.chars();
        match chars.next() {
            Some(' ') => hunk.ops.push(DiffOp::Context {
                text: chars.as_str().to_string(),
                newline: true,
            }),
            Some('+') => hunk.ops.push(DiffOp::Add {
                text: chars.as_str().to_string(),
                newline: true,
            }),
            Some('-') => hunk.ops.push(DiffOp::Remove {
                text: chars.as_str().to_string(),
                newline: true,
            }),
            // A completely empty line inside a hunk is a context line whose
            // content is empty (some producers drop the leading space).
            None => hunk.ops.push(DiffOp::Context {
                text: String::new(),
                newline: true,
            }),
            Some(other) => {
                return Err(DiffError::Parse {
                    line: line_no,
                    message: format!("unexpected line prefix {other:?} inside hunk"),
                })
            }
        }
    }

    Ok(hunks)
}

/// Parse `@@ -old_start[,old_len] +new_start[,new_len] @@ ...`.
fn parse_header(line: &str, line_no: usize) -> DiffResult<(usize, usize, usize, usize)> {
    let malformed = |message: &str| DiffError::Parse {
        line: line_no,
        message: message.to_string(),
    };

    let body = line
        .strip_prefix("@@")
        .and_then(|rest| rest.find("@@").map(|end| &rest[..end]))
        .ok_or_else(|| malformed("hunk header missing closing @@"))?;

    let mut old_range = None;
    let mut new_range = None;
    for token in body.split_whitespace() {
        if let Some(spec) = token.strip_prefix('-') {
            old_range = Some(parse_range(spec).ok_or_else(|| malformed("bad old range"))?);
        } else if let Some(spec) = token.strip_prefix('+') {
            new_range = Some(parse_range(spec).ok_or_else(|| malformed("bad new range"))?);
        }
    }

    let (old_start, old_len) = old_range.ok_or_else(|| malformed("missing old range"))?;
    let (new_start, new_len) = new_range.ok_or_else(|| malformed("missing new range"))?;
    Ok((old_start, old_len, new_start, new_len))
}

/// `start[,len]`; a missing length defaults to 1.
fn parse_range(spec: &str) -> Option<(usize, usize)> {
    match spec.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((spec.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_hunk() {
        let diff = "@@ -1,2 +1,2 @@\n a\n-b\n+B\n";
        let hunks = parse(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!((h.old_start, h.old_len, h.new_start, h.new_len), (1, 2, 1, 2));
        assert_eq!(h.ops.len(), 3);
        assert_eq!(h.ops[0], DiffOp::Context { text: "a".into(), newline: true });
        assert_eq!(h.ops[1], DiffOp::Remove { text: "b".into(), newline: true });
        assert_eq!(h.ops[2], DiffOp::Add { text: "B".into(), newline: true });
    }

    #[test]
    fn missing_length_defaults_to_one() {
        let hunks = parse("@@ -3 +4 @@\n-x\n+y\n").unwrap();
        assert_eq!(hunks[0].old_len, 1);
        assert_eq!(hunks[0].new_len, 1);
        assert_eq!(hunks[0].old_start, 3);
        assert_eq!(hunks[0].new_start, 4);
    }

    #[test]
    fn preamble_is_ignored() {
        let diff = "--- a/file\n+++ b/file\n@@ -1,1 +1,1 @@\n-a\n+b\n";
        let hunks = parse(diff).unwrap();
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].ops.len(), 2);
    }

    #[test]
    fn multiple_hunks_ordered() {
        let diff = "@@ -1,1 +1,1 @@\n-a\n+A\n@@ -10,1 +10,1 @@\n-b\n+B\n";
        let hunks = parse(diff).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[1].old_start, 10);
    }

    #[test]
    fn newline_marker_clears_flag() {
        let diff = "@@ -1,1 +1,1 @@\n-a\n+b\n\\ No newline at end of file\n";
        let hunks = parse(diff).unwrap();
        assert_eq!(hunks[0].ops[1], DiffOp::Add { text: "b".into(), newline: false });
    }

    #[test]
    fn empty_line_is_empty_context() {
        let diff = "@@ -1,3 +1,3 @@\n a\n\n-b\n+B\n";
        let hunks = parse(diff).unwrap();
        assert_eq!(hunks[0].ops[1], DiffOp::Context { text: String::new(), newline: true });
    }

    #[test]
    fn garbage_prefix_rejected() {
        let err = parse("@@ -1,1 +1,1 @@\n*bad\n").unwrap_err();
        assert!(matches!(err, DiffError::Parse { .. }));
    }

    #[test]
    fn header_with_section_text() {
        let hunks = parse("@@ -4,2 +4,3 @@ fn main() {\n a\n+b\n c\n").unwrap();
        assert_eq!(hunks[0].old_start, 4);
        assert_eq!(hunks[0].new_len, 3);
    }

    #[test]
    fn consumed_and_produced_counts() {
        let hunks = parse("@@ -1,2 +1,2 @@\n a\n-b\n+B\n").unwrap();
        assert_eq!(hunks[0].consumed(), 2);
        assert_eq!(hunks[0].produced(), 2);
    }

    #[test]
    fn empty_diff_no_hunks() {
        assert!(parse("").unwrap().is_empty());
    }
}
