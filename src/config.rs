use serde::{Deserialize, Serialize};
use sqlparser::dialect::{
    Dialect, DuckDbDialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Generic,
    MySql,
    PostgreSql,
    Sqlite,
    DuckDb,
    MsSql,
}

impl SqlDialect {
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Generic => Box::new(GenericDialect {}),
            SqlDialect::MySql => Box::new(MySqlDialect {}),
            SqlDialect::PostgreSql => Box::new(PostgreSqlDialect {}),
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
            SqlDialect::DuckDb => Box::new(DuckDbDialect {}),
            SqlDialect::MsSql => Box::new(MsSqlDialect {}),
        }
    }
}

/// Layout of the WITH clause after composition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WithClauseStyle {
    /// `WITH` on its own line, then one line per CTE.
    #[default]
    OneLinePerCte,
    /// Each CTE body on its own indented lines inside `AS (...)`.
    Expanded,
    /// Everything on a single line.
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposerConfig {
    pub dialect: SqlDialect,
    pub with_style: WithClauseStyle,
    pub indent_width: usize, // spaces per indent level
    pub format_output: bool, // false returns the structural composition as-is
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::Generic,
            with_style: WithClauseStyle::OneLinePerCte,
            indent_width: 4,
            format_output: true,
        }
    }
}
