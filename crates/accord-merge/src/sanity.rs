//! Post-merge sanity pass.
//!
//! Scans for class/function/branch header lines present in either input
//! version but absent from the merged output. A structurally significant
//! line disappearing during a merge usually means a hunk landed wrong or a
//! conflict resolution ate a block. The warnings are advisory only.

use std::collections::BTreeSet;

use regex_lite::Regex;

fn header_patterns() -> Vec<Regex> {
    [
        r"^\s*(?:pub\s+)?fn\s+[A-Za-z_]",
        r"^\s*class\s+[A-Za-z_]",
        r"^\s*def\s+[A-Za-z_]",
        r"^\s*(?:if|for|while|match)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
}

/// Header lines present in any input but missing from the merged output.
pub fn lost_code_warnings(inputs: &[&str], merged: &str) -> Vec<String> {
    let patterns = header_patterns();
    let is_header = |line: &str| patterns.iter().any(|p| p.is_match(line));

    let merged_headers: BTreeSet<&str> = merged
        .lines()
        .filter(|l| is_header(l))
        .map(str::trim)
        .collect();

    let mut warnings = Vec::new();
    let mut seen = BTreeSet::new();
    for input in inputs {
        for line in input.lines().filter(|l| is_header(l)) {
            let trimmed = line.trim();
            if !merged_headers.contains(trimmed) && seen.insert(trimmed.to_string()) {
                warnings.push(format!("possible lost code: {trimmed:?}"));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_warnings_when_everything_survives() {
        let a = "fn alpha() {}\nfn beta() {}\n";
        let merged = "fn alpha() {}\nfn beta() {}\nfn gamma() {}\n";
        assert!(lost_code_warnings(&[a], merged).is_empty());
    }

    #[test]
    fn dropped_function_is_reported() {
        let a = "fn alpha() {}\nfn beta() {}\n";
        let merged = "fn alpha() {}\n";
        let warnings = lost_code_warnings(&[a], merged);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("fn beta"));
    }

    #[test]
    fn branch_headers_detected() {
        let a = "if ready {\n    go();\n}\n";
        let warnings = lost_code_warnings(&[a], "go();\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("if ready"));
    }

    #[test]
    fn python_defs_detected() {
        let a = "class Widget:\n    def render(self):\n        pass\n";
        let warnings = lost_code_warnings(&[a], "pass\n");
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn duplicate_losses_reported_once() {
        let a = "fn gone() {}\n";
        let b = "fn gone() {}\n";
        let warnings = lost_code_warnings(&[a, b], "");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn plain_lines_never_warn() {
        let warnings = lost_code_warnings(&["x = 1\ny = 2\n"], "");
        assert!(warnings.is_empty());
    }

    #[test]
    fn whitespace_shift_still_matches() {
        let a = "    fn indented() {}\n";
        let merged = "fn indented() {}\n";
        assert!(lost_code_warnings(&[a], merged).is_empty());
    }
}
