//! Pluggable pre-commit content validation.

/// Validates produced content before it is written to disk.
///
/// The diff engine never interprets file content itself; callers plug in a
/// check appropriate for the tree they manage. A failing check aborts the
/// commit with `SyntaxInvalid` and nothing is written.
pub trait SyntaxCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `Err(reason)` when `content` must not be written to `path`.
    fn check(&self, path: &str, content: &str) -> Result<(), String>;
}

/// Accepts everything.
pub struct NoCheck;

impl SyntaxCheck for NoCheck {
    fn name(&self) -> &str {
        "none"
    }

    fn check(&self, _path: &str, _content: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Checks that `()`, `[]`, and `{}` balance, ignoring delimiters inside
/// string literals, char literals, and `//`/`#` line comments.
///
/// Intentionally coarse. It catches the dominant failure mode of a bad
/// merge (a dropped or duplicated block) without pretending to parse any
/// particular language.
pub struct BalancedDelimiters;

impl SyntaxCheck for BalancedDelimiters {
    fn name(&self) -> &str {
        "balanced-delimiters"
    }

    fn check(&self, path: &str, content: &str) -> Result<(), String> {
        let _ = path;
        let mut stack: Vec<(char, usize)> = Vec::new();

        for (line_idx, line) in content.lines().enumerate() {
            let line_no = line_idx + 1;
            let mut chars = line.chars().peekable();
            let mut in_string: Option<char> = None;

            while let Some(ch) = chars.next() {
                if let Some(quote) = in_string {
                    if ch == '\\' {
                        chars.next();
                    } else if ch == quote {
                        in_string = None;
                    }
                    continue;
                }
                match ch {
                    '"' => in_string = Some(ch),
                    // A single quote only opens a char literal when one
                    // plausibly closes right after ('x' or '\x'); a bare
                    // apostrophe or lifetime tick is left alone.
                    '\'' => {
                        let mut ahead = chars.clone();
                        match ahead.next() {
                            Some('\\') => {
                                ahead.next();
                                if ahead.next() == Some('\'') {
                                    chars = ahead;
                                }
                            }
                            Some(_) if ahead.next() == Some('\'') => chars = ahead,
                            _ => {}
                        }
                    }
                    '#' => break,
                    '/' if chars.peek() == Some(&'/') => break,
                    '(' | '[' | '{' => stack.push((ch, line_no)),
                    ')' | ']' | '}' => {
                        let expected = matching_open(ch);
                        match stack.pop() {
                            Some((open, _)) if open == expected => {}
                            Some((open, open_line)) => {
                                return Err(format!(
                                    "line {line_no}: {ch:?} closes {open:?} opened at line {open_line}"
                                ));
                            }
                            None => {
                                return Err(format!("line {line_no}: unmatched {ch:?}"));
                            }
                        }
                    }
                    _ => {}
                }
            }
            // A string literal left open at end of line is tolerated: several
            // languages allow multi-line strings and this check must not
            // reject them.
        }

        if let Some((open, line)) = stack.pop() {
            return Err(format!("{open:?} opened at line {line} is never closed"));
        }
        Ok(())
    }
}

fn matching_open(close: char) -> char {
    match close {
        ')' => '(',
        ']' => '[',
        '}' => '{',
        _ => unreachable!("not a closing delimiter"),
    }
}
