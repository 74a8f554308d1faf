//! Narrow view over `sqlparser` exposing only what the CTE engine reads:
//! the WITH clause of a query, each CTE's name and body, and the table names a
//! body references.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Cte, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Join,
    JoinConstraint, JoinOperator, ObjectName, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins,
};
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CteTable {
    pub name: String,
    pub definition: Cte,
}

impl CteTable {
    pub fn from_cte(definition: Cte) -> Self {
        Self {
            name: definition.alias.name.value.clone(),
            definition,
        }
    }

    pub fn body(&self) -> &Query {
        &self.definition.query
    }

    /// `name AS (body)` as printed by the parser.
    pub fn to_sql(&self) -> String {
        self.definition.to_string()
    }

    /// Column list written after the CTE name, e.g. `totals(region, amount)`.
    pub fn declared_columns(&self) -> Vec<String> {
        self.definition
            .alias
            .columns
            .iter()
            .map(|column| column.value.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct WithClause {
    pub recursive: bool,
    pub tables: Vec<CteTable>,
}

impl WithClause {
    pub fn from_ctes(recursive: bool, ctes: Vec<Cte>) -> Self {
        Self {
            recursive,
            tables: ctes.into_iter().map(CteTable::from_cte).collect(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn into_ctes(self) -> Vec<Cte> {
        self.tables.into_iter().map(|table| table.definition).collect()
    }
}

/// A query split into its WITH clause and the body that follows it.
#[derive(Debug, Clone)]
pub struct SimpleQuery {
    pub with_clause: Option<WithClause>,
    pub body: Query,
}

pub fn to_simple_query(mut query: Query) -> SimpleQuery {
    let with_clause = query
        .with
        .take()
        .map(|with| WithClause::from_ctes(with.recursive, with.cte_tables));
    SimpleQuery {
        with_clause,
        body: query,
    }
}

/// Parses exactly one query statement. DDL and DML statements are rejected.
pub fn parse_query(sql: &str, dialect: &dyn Dialect) -> Result<Query, ParserError> {
    let statements = Parser::parse_sql(dialect, sql)?;
    let mut iter = statements.into_iter();
    match (iter.next(), iter.next()) {
        (Some(Statement::Query(query)), None) => Ok(*query),
        (None, _) => Err(ParserError::ParserError(
            "expected a query statement, found empty input".to_string(),
        )),
        (Some(_), None) => Err(ParserError::ParserError(
            "expected a query statement".to_string(),
        )),
        (Some(_), Some(_)) => Err(ParserError::ParserError(
            "expected a single query statement, found several".to_string(),
        )),
    }
}

/// Parses `WITH [RECURSIVE] name AS (...) [, ...]` with nothing after it but
/// optional semicolons.
pub fn parse_with_clause_only(text: &str, dialect: &dyn Dialect) -> Result<WithClause, ParserError> {
    let mut parser = Parser::new(dialect).try_with_sql(text)?;

    if !parser.parse_keyword(Keyword::WITH) {
        return Err(ParserError::ParserError(format!(
            "expected WITH, found {}",
            parser.peek_token().token
        )));
    }
    let recursive = parser.parse_keyword(Keyword::RECURSIVE);
    let ctes = parser.parse_comma_separated(Parser::parse_cte)?;

    while parser.consume_token(&Token::SemiColon) {}
    let next = parser.peek_token().token;
    if next != Token::EOF {
        return Err(ParserError::ParserError(format!(
            "unexpected {} after WITH clause",
            next
        )));
    }

    Ok(WithClause::from_ctes(recursive, ctes))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParseMethod {
    BareWithClause,
    FullStatement,
}

/// Order in which CTE-definition text is interpreted.
pub const CTE_PARSE_STRATEGIES: [ParseMethod; 2] =
    [ParseMethod::BareWithClause, ParseMethod::FullStatement];

impl ParseMethod {
    pub fn parse(&self, text: &str, dialect: &dyn Dialect) -> Result<WithClause, ParserError> {
        match self {
            ParseMethod::BareWithClause => parse_with_clause_only(text, dialect),
            ParseMethod::FullStatement => {
                let query = parse_query(text, dialect)?;
                to_simple_query(query).with_clause.ok_or_else(|| {
                    ParserError::ParserError("statement has no WITH clause".to_string())
                })
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParseMethod::BareWithClause => "bare WITH clause",
            ParseMethod::FullStatement => "full statement",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedDefinitions {
    pub clause: WithClause,
    pub method: ParseMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub method: ParseMethod,
    pub message: String,
}

/// Tries each strategy of [`CTE_PARSE_STRATEGIES`] in turn and reports either
/// the first success or every failure.
pub fn parse_with_strategies(
    text: &str,
    dialect: &dyn Dialect,
) -> Result<ParsedDefinitions, Vec<StrategyFailure>> {
    let mut failures = Vec::new();
    for method in CTE_PARSE_STRATEGIES {
        match method.parse(text, dialect) {
            Ok(clause) => return Ok(ParsedDefinitions { clause, method }),
            Err(e) => failures.push(StrategyFailure {
                method,
                message: e.to_string(),
            }),
        }
    }
    Err(failures)
}

// --- table references ---

#[derive(Default)]
struct TableRefs {
    names: IndexSet<String>,
    // CTE names declared by each enclosing query, innermost last
    scopes: Vec<HashSet<String>>,
}

/// Every table or CTE name the query reads from, in first-seen order.
/// Names declared by a WITH clause inside `query` itself are left out.
pub fn referenced_tables(query: &Query) -> IndexSet<String> {
    let mut refs = TableRefs::default();
    visit_query(query, &mut refs);
    refs.names
}

fn visit_query(query: &Query, refs: &mut TableRefs) {
    let local: HashSet<String> = query
        .with
        .as_ref()
        .map(|with| {
            with.cte_tables
                .iter()
                .map(|cte| cte.alias.name.value.clone())
                .collect()
        })
        .unwrap_or_default();

    refs.scopes.push(local);
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            visit_query(&cte.query, refs);
        }
    }
    visit_set_expr(&query.body, refs);
    for order_by in &query.order_by {
        visit_expr_for_subquery(&order_by.expr, refs);
    }
    refs.scopes.pop();
}

fn visit_set_expr(expr: &SetExpr, refs: &mut TableRefs) {
    match expr {
        SetExpr::Select(select) => visit_select(select, refs),
        SetExpr::Query(query) => visit_query(query, refs),
        SetExpr::SetOperation { left, right, .. } => {
            visit_set_expr(left, refs);
            visit_set_expr(right, refs);
        }
        _ => {}
    }
}

fn visit_select(select: &Select, refs: &mut TableRefs) {
    for table_with_joins in &select.from {
        visit_table_with_joins(table_with_joins, refs);
    }
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                visit_expr_for_subquery(expr, refs);
            }
            _ => {}
        }
    }
    if let Some(selection) = &select.selection {
        visit_expr_for_subquery(selection, refs);
    }
    if let GroupByExpr::Expressions(exprs, ..) = &select.group_by {
        for expr in exprs {
            visit_expr_for_subquery(expr, refs);
        }
    }
    for expr in select.sort_by.iter().chain(select.having.iter()).chain(select.qualify.iter()) {
        visit_expr_for_subquery(expr, refs);
    }
}

fn visit_table_with_joins(table: &TableWithJoins, refs: &mut TableRefs) {
    visit_table_factor(&table.relation, refs);
    for join in &table.joins {
        visit_table_factor(&join.relation, refs);
        if let Some(JoinConstraint::On(expr)) = join_constraint(join) {
            visit_expr_for_subquery(expr, refs);
        }
    }
}

fn join_constraint(join: &Join) -> Option<&JoinConstraint> {
    match &join.join_operator {
        JoinOperator::Inner(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint) => Some(constraint),
        _ => None,
    }
}

fn visit_table_factor(factor: &TableFactor, refs: &mut TableRefs) {
    match factor {
        TableFactor::Table { name, .. } => push_object_name(name, refs),
        TableFactor::Derived { subquery, .. } => visit_query(subquery, refs),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => visit_table_with_joins(table_with_joins, refs),
        _ => {}
    }
}

fn visit_expr_for_subquery(expr: &Expr, refs: &mut TableRefs) {
    match expr {
        Expr::Subquery(query) => visit_query(query, refs),
        Expr::Exists { subquery, .. } => visit_query(subquery, refs),
        Expr::InSubquery { expr, subquery, .. } => {
            visit_expr_for_subquery(expr, refs);
            visit_query(subquery, refs);
        }
        Expr::BinaryOp { left, right, .. }
        | Expr::AnyOp { left, right, .. }
        | Expr::AllOp { left, right, .. }
        | Expr::IsDistinctFrom(left, right)
        | Expr::IsNotDistinctFrom(left, right) => {
            visit_expr_for_subquery(left, refs);
            visit_expr_for_subquery(right, refs);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            visit_expr_for_subquery(expr, refs);
            visit_expr_for_subquery(pattern, refs);
        }
        Expr::InList { expr, list, .. } => {
            visit_expr_for_subquery(expr, refs);
            for item in list {
                visit_expr_for_subquery(item, refs);
            }
        }
        Expr::Tuple(items) => {
            for item in items {
                visit_expr_for_subquery(item, refs);
            }
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::Cast { expr, .. } => visit_expr_for_subquery(expr, refs),
        Expr::Between {
            expr, low, high, ..
        } => {
            visit_expr_for_subquery(expr, refs);
            visit_expr_for_subquery(low, refs);
            visit_expr_for_subquery(high, refs);
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                visit_expr_for_subquery(operand, refs);
            }
            for condition in conditions {
                visit_expr_for_subquery(condition, refs);
            }
            for result in results {
                visit_expr_for_subquery(result, refs);
            }
            if let Some(else_result) = else_result {
                visit_expr_for_subquery(else_result, refs);
            }
        }
        Expr::Function(function) => {
            visit_function_arguments(&function.args, refs);
            if let Some(filter) = &function.filter {
                visit_expr_for_subquery(filter, refs);
            }
        }
        _ => {}
    }
}

fn visit_function_arguments(args: &FunctionArguments, refs: &mut TableRefs) {
    match args {
        FunctionArguments::None => {}
        FunctionArguments::Subquery(query) => visit_query(query, refs),
        FunctionArguments::List(list) => {
            for arg in &list.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Expr(expr),
                        ..
                    } => visit_expr_for_subquery(expr, refs),
                    _ => {}
                }
            }
        }
    }
}

fn push_object_name(name: &ObjectName, refs: &mut TableRefs) {
    let parts: Vec<String> = name.0.iter().map(|ident| ident.value.clone()).collect();
    if parts.is_empty() {
        return;
    }
    let full_name = parts.join(".");

    if parts.len() == 1 && refs.scopes.iter().any(|scope| scope.contains(&full_name)) {
        return;
    }
    refs.names.insert(full_name);
}

// --- columns ---

/// Best-effort output column list for a CTE. Empty when it cannot be known
/// without a catalog (wildcards, unnamed expressions).
pub fn infer_columns(table: &CteTable) -> Vec<String> {
    let declared = table.declared_columns();
    if !declared.is_empty() {
        return declared;
    }
    query_columns(table.body())
}

pub fn query_columns(query: &Query) -> Vec<String> {
    projection_columns(&query.body)
}

fn projection_columns(body: &SetExpr) -> Vec<String> {
    match body {
        SetExpr::Select(select) => {
            let mut columns = Vec::new();
            for item in &select.projection {
                match item {
                    SelectItem::ExprWithAlias { alias, .. } => columns.push(alias.value.clone()),
                    SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                        columns.push(ident.value.clone())
                    }
                    SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                        match parts.last() {
                            Some(ident) => columns.push(ident.value.clone()),
                            None => return Vec::new(),
                        }
                    }
                    _ => return Vec::new(),
                }
            }
            columns
        }
        SetExpr::Query(query) => projection_columns(&query.body),
        SetExpr::SetOperation { left, .. } => projection_columns(left),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests;
