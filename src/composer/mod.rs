//! Merges a main query with CTE definitions into one executable statement.

use crate::config::ComposerConfig;
use crate::error::{CteError, ParseInput, Result};
use crate::formatter::SqlFormatter;
use crate::parser::{parse_query, parse_with_strategies, referenced_tables, to_simple_query, ParsedDefinitions};
use crate::sql_text::{starts_with_keyword, strip_leading_comments};
use sqlparser::ast::Cte;
use std::collections::HashSet;

pub struct CteComposer {
    config: ComposerConfig,
}

impl Default for CteComposer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}

impl CteComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Parses CTE-definition text, trying a bare WITH clause first and a full
    /// `WITH ... SELECT` statement second.
    pub fn parse_definitions(&self, cte_definitions: &str) -> Result<ParsedDefinitions> {
        let normalized = normalize_definitions(cte_definitions);
        let parser_dialect = self.config.dialect.parser_dialect();

        match parse_with_strategies(&normalized, &*parser_dialect) {
            Ok(parsed) => {
                log::debug!(
                    "parsed {} CTE definition(s) as {}",
                    parsed.clause.len(),
                    parsed.method.label()
                );
                Ok(parsed)
            }
            Err(failures) => {
                let details = failures
                    .iter()
                    .map(|failure| format!("{}: {}", failure.method.label(), failure.message))
                    .collect::<Vec<String>>()
                    .join("; ");
                Err(CteError::parse(
                    ParseInput::CteDefinitions,
                    format!(
                        "input must be either a bare WITH clause (`WITH name AS (...)`) or a complete query that begins with a WITH clause ({})",
                        details
                    ),
                ))
            }
        }
    }

    /// Number of CTEs `compose` would inject for this text. Empty or
    /// unparseable text counts as zero.
    pub fn count_ctes(&self, cte_definitions: &str) -> usize {
        if cte_definitions.trim().is_empty() {
            return 0;
        }
        match self.parse_definitions(cte_definitions) {
            Ok(parsed) => parsed.clause.len(),
            Err(e) => {
                log::debug!("counting CTEs failed: {}", e);
                0
            }
        }
    }

    /// Prepends the CTEs in `cte_definitions` to `main_query`'s own WITH
    /// clause (or gives it one). Blank definitions return `main_query`
    /// untouched, byte for byte.
    pub fn compose(&self, main_query: &str, cte_definitions: &str) -> Result<String> {
        if cte_definitions.trim().is_empty() {
            return Ok(main_query.to_string());
        }
        let parsed = self.parse_definitions(cte_definitions)?;
        let recursive = parsed.clause.recursive;
        self.merge(main_query, parsed.clause.into_ctes(), recursive)
    }

    /// Same as [`compose`](Self::compose) for CTEs that are already parsed.
    pub fn compose_with_ctes(&self, main_query: &str, ctes: &[Cte]) -> Result<String> {
        if ctes.is_empty() {
            return Ok(main_query.to_string());
        }
        self.merge(main_query, ctes.to_vec(), false)
    }

    fn merge(&self, main_query: &str, injected: Vec<Cte>, injected_recursive: bool) -> Result<String> {
        let parser_dialect = self.config.dialect.parser_dialect();
        let main = parse_query(main_query, &*parser_dialect)
            .map_err(|e| CteError::parse(ParseInput::MainQuery, e.to_string()))?;
        let simple = to_simple_query(main);

        let (existing, existing_recursive) = match simple.with_clause {
            Some(with) => {
                let recursive = with.recursive;
                (with.into_ctes(), recursive)
            }
            None => (Vec::new(), false),
        };

        let mut seen = HashSet::new();
        for cte in injected.iter().chain(existing.iter()) {
            let name = cte.alias.name.value.to_lowercase();
            if !seen.insert(name) {
                log::warn!(
                    "CTE '{}' is defined more than once in the composed query",
                    cte.alias.name.value
                );
            }
        }

        let recursive = injected_recursive
            || existing_recursive
            || injected.iter().any(is_self_referencing);

        let definitions = injected
            .iter()
            .chain(existing.iter())
            .map(|cte| cte.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        let composed = format!(
            "WITH {}{} {}",
            if recursive { "RECURSIVE " } else { "" },
            definitions,
            simple.body
        );

        Ok(self.finish(composed))
    }

    /// Pretty-prints when configured to. Formatting problems fall back to the
    /// unformatted statement.
    fn finish(&self, composed: String) -> String {
        if !self.config.format_output {
            return composed;
        }
        let formatter = SqlFormatter::new(
            self.config.dialect,
            self.config.with_style,
            self.config.indent_width,
        );
        match formatter.format(&composed) {
            Ok(formatted) => formatted,
            Err(e) => {
                log::warn!("formatting composed query failed, returning it unformatted: {}", e);
                composed
            }
        }
    }
}

fn is_self_referencing(cte: &Cte) -> bool {
    let name = &cte.alias.name.value;
    referenced_tables(&cte.query)
        .iter()
        .any(|reference| reference.eq_ignore_ascii_case(name))
}

/// Adds a leading `WITH` when the text starts straight with a definition.
/// Leading comments are only skipped for the check and stay in the text.
pub fn normalize_definitions(cte_definitions: &str) -> String {
    let trimmed = cte_definitions.trim();
    if starts_with_keyword(strip_leading_comments(trimmed), "WITH") {
        trimmed.to_string()
    } else {
        format!("WITH {}", trimmed)
    }
}

pub fn compose(main_query: &str, cte_definitions: &str) -> Result<String> {
    CteComposer::default().compose(main_query, cte_definitions)
}

pub fn count_ctes(cte_definitions: &str) -> usize {
    CteComposer::default().count_ctes(cte_definitions)
}

#[cfg(test)]
mod tests;
