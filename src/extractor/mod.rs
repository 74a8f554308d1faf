//! Decomposes a query's WITH clause into named fragments.

use crate::analyzer::annotate_dependents;
use crate::config::SqlDialect;
use crate::error::{CteError, ParseInput, Result};
use crate::fragment::{Fragment, FragmentMap, MainQuery};
use crate::isolator::isolate_main_query;
use crate::parser::{
    infer_columns, parse_query, query_columns, referenced_tables, to_simple_query, WithClause,
};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sqlparser::dialect::Dialect;
use std::collections::HashMap;

/// Result of splitting one query into fragments plus the statement after them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decomposition {
    pub fragments: FragmentMap,
    pub main_query: MainQuery,
    pub recursive: bool, // source used WITH RECURSIVE
}

/// Parses `sql`, extracts one fragment per CTE and derives dependents.
pub fn decompose(sql: &str, dialect: SqlDialect) -> Result<Decomposition> {
    let parser_dialect = dialect.parser_dialect();
    let query = parse_query(sql, &*parser_dialect)
        .map_err(|e| CteError::parse(ParseInput::SourceQuery, e.to_string()))?;
    let simple = to_simple_query(query);

    let (mut fragments, recursive) = match &simple.with_clause {
        Some(with) => (fragments_from_with_clause(with), with.recursive),
        None => (FragmentMap::new(), false),
    };
    annotate_dependents(&mut fragments);

    log::debug!(
        "decomposed query into {} fragment(s): {:?}",
        fragments.len(),
        fragments.names().collect::<Vec<_>>()
    );

    Ok(Decomposition {
        fragments,
        main_query: MainQuery {
            text: simple.body.to_string(),
            with_clause_already_present: false,
        },
        recursive,
    })
}

/// Fragments of `sql`'s WITH clause in written order. Dependents are left
/// empty; run `analyzer::analyze_dependents` to fill them.
pub fn extract_fragments(sql: &str, dialect: SqlDialect) -> Result<FragmentMap> {
    let parser_dialect = dialect.parser_dialect();
    let query = parse_query(sql, &*parser_dialect)
        .map_err(|e| CteError::parse(ParseInput::SourceQuery, e.to_string()))?;

    Ok(to_simple_query(query)
        .with_clause
        .map(|with| fragments_from_with_clause(&with))
        .unwrap_or_default())
}

/// Case-insensitive lookup from any spelling of a sibling name to the name
/// as written in its own definition.
fn sibling_lookup<'a, I>(names: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .map(|name| (name.to_lowercase(), name.to_string()))
        .collect()
}

/// Splits raw references into sibling dependencies and external tables.
/// A reference to the fragment's own name marks it recursive.
fn classify_references(
    fragment: &mut Fragment,
    references: IndexSet<String>,
    siblings: &HashMap<String, String>,
) {
    fragment.dependencies.clear();
    fragment.tables.clear();
    fragment.recursive = false;

    for reference in references {
        match siblings.get(&reference.to_lowercase()) {
            Some(canonical) if *canonical == fragment.name => fragment.recursive = true,
            Some(canonical) => {
                fragment.dependencies.insert(canonical.clone());
            }
            None => {
                fragment.tables.insert(reference);
            }
        }
    }
}

pub fn fragments_from_with_clause(with: &WithClause) -> FragmentMap {
    let siblings = sibling_lookup(with.tables.iter().map(|table| table.name.as_str()));
    let mut fragments = FragmentMap::new();

    for table in &with.tables {
        let mut fragment = Fragment::new(table.name.clone(), table.body().to_string());
        classify_references(&mut fragment, referenced_tables(table.body()), &siblings);
        fragment.columns = infer_columns(table);

        if fragments.insert(fragment).is_some() {
            log::warn!(
                "duplicate CTE name '{}' in WITH clause, keeping the last definition",
                table.name
            );
        }
    }

    fragments
}

/// Recomputes dependencies, tables, the recursive flag and columns from each
/// fragment's current query text, then re-derives dependents.
///
/// Every body is parsed before anything is written, so a parse failure leaves
/// the map exactly as it was.
pub fn refresh_dependencies(fragments: &mut FragmentMap, dialect: SqlDialect) -> Result<()> {
    let parser_dialect = dialect.parser_dialect();
    let mut parsed = Vec::with_capacity(fragments.len());

    for fragment in fragments.iter() {
        let query = parse_query(&fragment.query, &*parser_dialect).map_err(|e| {
            CteError::parse(ParseInput::Fragment(fragment.name.clone()), e.to_string())
        })?;
        parsed.push((fragment.name.clone(), query));
    }

    let siblings = sibling_lookup(fragments.names());
    for (name, query) in parsed {
        if let Some(fragment) = fragments.get_mut(&name) {
            classify_references(fragment, referenced_tables(&query), &siblings);
            let columns = query_columns(&query);
            if !columns.is_empty() {
                fragment.columns = columns;
            }
        }
    }

    annotate_dependents(fragments);
    Ok(())
}

/// Recomputes one fragment's edges from its current text and re-derives
/// dependents for the whole map.
pub fn refresh_fragment(fragments: &mut FragmentMap, name: &str, dialect: SqlDialect) -> Result<()> {
    let parser_dialect = dialect.parser_dialect();
    let query = parse_query(&fragments.require(name)?.query, &*parser_dialect)
        .map_err(|e| CteError::parse(ParseInput::Fragment(name.to_string()), e.to_string()))?;

    let siblings = sibling_lookup(fragments.names());
    if let Some(fragment) = fragments.get_mut(name) {
        classify_references(fragment, referenced_tables(&query), &siblings);
        fragment.columns = query_columns(&query);
    }

    annotate_dependents(fragments);
    Ok(())
}

/// Checks that the text-level isolator and the parser agree on the main
/// statement. Both sides are normalized through the parser before comparing.
pub fn isolation_agrees(sql: &str, dialect: SqlDialect) -> bool {
    let parser_dialect = dialect.parser_dialect();
    let Some(from_ast) = ast_main_query(sql, &*parser_dialect) else {
        return false;
    };

    let isolated = isolate_main_query(sql);
    let from_text = match parse_query(&isolated, &*parser_dialect) {
        Ok(query) => query.to_string(),
        Err(e) => {
            log::warn!("isolated main query does not parse: {}", e);
            return false;
        }
    };

    if from_ast != from_text {
        log::warn!(
            "main query isolation mismatch: parser gave '{}', text scan gave '{}'",
            from_ast,
            from_text
        );
        return false;
    }
    true
}

fn ast_main_query(sql: &str, dialect: &dyn Dialect) -> Option<String> {
    parse_query(sql, dialect)
        .ok()
        .map(|query| to_simple_query(query).body.to_string())
}
