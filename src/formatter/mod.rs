//! Layout of composed SQL. The statement is re-parsed first, so formatting
//! also acts as a final validity check; callers treat a failure here as
//! non-fatal and keep the unformatted text.

use crate::config::{SqlDialect, WithClauseStyle};
use crate::error::{CteError, ParseInput, Result};
use crate::parser::{parse_query, to_simple_query, CteTable};
use crate::sql_text::indent_lines;

pub struct SqlFormatter {
    dialect: SqlDialect,
    style: WithClauseStyle,
    indent_width: usize,
}

impl SqlFormatter {
    pub fn new(dialect: SqlDialect, style: WithClauseStyle, indent_width: usize) -> Self {
        Self {
            dialect,
            style,
            indent_width,
        }
    }

    pub fn format(&self, sql: &str) -> Result<String> {
        let parser_dialect = self.dialect.parser_dialect();
        let query = parse_query(sql, &*parser_dialect)
            .map_err(|e| CteError::parse(ParseInput::ComposedQuery, e.to_string()))?;
        let simple = to_simple_query(query);
        let body = simple.body.to_string();

        let Some(with) = simple.with_clause.filter(|with| !with.is_empty()) else {
            return Ok(body);
        };
        let keyword = if with.recursive { "WITH RECURSIVE" } else { "WITH" };

        let formatted = match self.style {
            WithClauseStyle::OneLinePerCte => {
                let pad = " ".repeat(self.indent_width);
                let lines = with
                    .tables
                    .iter()
                    .map(|table| format!("{}{}", pad, table.to_sql()))
                    .collect::<Vec<String>>()
                    .join(",\n");
                format!("{}\n{}\n{}", keyword, lines, body)
            }
            WithClauseStyle::Expanded => {
                let blocks = with
                    .tables
                    .iter()
                    .map(|table| self.expanded_cte(table))
                    .collect::<Vec<String>>()
                    .join(",\n");
                format!("{} {}\n{}", keyword, blocks, body)
            }
            WithClauseStyle::Compact => {
                let inline = with
                    .tables
                    .iter()
                    .map(CteTable::to_sql)
                    .collect::<Vec<String>>()
                    .join(", ");
                format!("{} {} {}", keyword, inline, body)
            }
        };

        Ok(formatted)
    }

    fn expanded_cte(&self, table: &CteTable) -> String {
        let definition = &table.definition;
        let materialized = definition
            .materialized
            .as_ref()
            .map(|m| format!("{} ", m))
            .unwrap_or_default();
        let from = definition
            .from
            .as_ref()
            .map(|from| format!(" FROM {}", from))
            .unwrap_or_default();

        format!(
            "{} AS {}(\n{}\n){}",
            definition.alias,
            materialized,
            indent_lines(&definition.query.to_string(), self.indent_width),
            from
        )
    }
}
