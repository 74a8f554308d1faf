// =====================================================
// SQL TEXT HELPERS
// Comment, literal and keyword handling at the text level
// =====================================================

use regex::Regex;
use std::sync::LazyLock;

static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    LineComment,
    BlockComment,
}

/// Blanks out string literals, quoted identifiers and comments while keeping
/// every byte offset intact, so the result can be scanned for parentheses and
/// keywords and then used to slice the input.
pub fn mask_literals_and_comments(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut state = ScanState::Code;
    let mut chars = sql.chars().peekable();

    let blank = |out: &mut String, c: char| {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    };

    while let Some(c) = chars.next() {
        match state {
            ScanState::Code => match c {
                '\'' => {
                    state = ScanState::SingleQuote;
                    masked.push(c);
                }
                '"' => {
                    state = ScanState::DoubleQuote;
                    masked.push(c);
                }
                '`' => {
                    state = ScanState::Backtick;
                    masked.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = ScanState::LineComment;
                    blank(&mut masked, c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                    masked.push_str("  ");
                }
                _ => masked.push(c),
            },
            ScanState::SingleQuote | ScanState::DoubleQuote | ScanState::Backtick => {
                let closing = match state {
                    ScanState::SingleQuote => '\'',
                    ScanState::DoubleQuote => '"',
                    _ => '`',
                };
                if c == closing {
                    state = ScanState::Code;
                    masked.push(c);
                } else {
                    blank(&mut masked, c);
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Code;
                    masked.push(c);
                } else {
                    blank(&mut masked, c);
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Code;
                    masked.push_str("  ");
                } else if c == '\n' {
                    masked.push(c);
                } else {
                    blank(&mut masked, c);
                }
            }
        }
    }

    masked
}

/// Skips leading whitespace, `--` line comments and `/* */` block comments.
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(pos) => after[pos + 1..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = match after.find("*/") {
                Some(pos) => after[pos + 2..].trim_start(),
                None => "",
            };
        } else {
            return rest;
        }
    }
}

/// Case-insensitive keyword prefix check that refuses partial words, so
/// `WITHDRAWALS AS (...)` does not count as starting with `WITH`.
pub fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    let Some(head) = text.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    text[keyword.len()..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}

pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER.is_match(name)
}

pub fn indent_lines(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<String>>()
        .join("\n")
}
