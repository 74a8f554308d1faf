//! Text-level isolation of the statement that follows a WITH clause.
//!
//! This is the fallback path next to the AST-based extractor: it never fails,
//! and for well-formed input it must land on the same statement the parser
//! does (see `extractor::isolation_agrees`).

use crate::sql_text::{mask_literals_and_comments, starts_with_keyword, strip_leading_comments};

/// Keywords that can start the statement following the CTE definitions.
const MAIN_STATEMENT_KEYWORDS: [&str; 6] = ["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES"];

/// Returns the top-level statement that follows every leading CTE definition.
///
/// Input that does not open with a WITH clause, or where no statement boundary
/// can be found, is returned unchanged. A WITH nested further inside the
/// statement belongs to a subquery and is left alone. CTE boundaries come from
/// parenthesis depth, so a `SELECT` nested inside a CTE body is never mistaken
/// for the main query.
pub fn isolate_main_query(sql: &str) -> String {
    let head = strip_leading_comments(sql);
    if !starts_with_keyword(head, "WITH") {
        return sql.to_string();
    }
    let with_pos = sql.len() - head.len();

    match find_main_statement(sql, with_pos + "WITH".len()) {
        Some(start) => sql[start..].trim_start().to_string(),
        None => {
            log::debug!("WITH clause found but no main statement follows it");
            sql.to_string()
        }
    }
}

/// Byte offset where the main statement begins, scanning from `from`.
fn find_main_statement(sql: &str, from: usize) -> Option<usize> {
    let masked = mask_literals_and_comments(sql);
    let mut depth: usize = 0;

    for (offset, c) in masked[from..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    // Unbalanced input; nothing sensible to isolate.
                    return None;
                }
                depth -= 1;
                if depth > 0 {
                    continue;
                }

                let after = from + offset + c.len_utf8();
                let rest = masked[after..].trim_start();
                if MAIN_STATEMENT_KEYWORDS
                    .iter()
                    .any(|keyword| starts_with_keyword(rest, keyword))
                {
                    return Some(masked.len() - rest.len());
                }
            }
            _ => {}
        }
    }

    None
}
