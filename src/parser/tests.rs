use super::*;
use sqlparser::dialect::{GenericDialect, PostgreSqlDialect};

fn names(set: &IndexSet<String>) -> Vec<&str> {
    set.iter().map(String::as_str).collect()
}

#[test]
fn test_parse_query_rejects_non_queries() {
    let dialect = GenericDialect {};
    assert!(parse_query("SELECT 1", &dialect).is_ok());
    assert!(parse_query("SELECT 1;", &dialect).is_ok());
    assert!(parse_query("DELETE FROM t", &dialect).is_err());
    assert!(parse_query("SELECT 1; SELECT 2", &dialect).is_err());
    assert!(parse_query("", &dialect).is_err());
}

#[test]
fn test_to_simple_query_splits_with_clause() {
    let query = parse_query(
        "WITH a AS (SELECT 1 AS x), b AS (SELECT x FROM a) SELECT * FROM b",
        &GenericDialect {},
    )
    .unwrap();
    let simple = to_simple_query(query);

    let with = simple.with_clause.unwrap();
    assert!(!with.recursive);
    assert_eq!(with.names(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(with.tables[1].body().to_string(), "SELECT x FROM a");
    assert!(simple.body.with.is_none());
    assert_eq!(simple.body.to_string(), "SELECT * FROM b");
}

#[test]
fn test_parse_with_clause_only() {
    let dialect = GenericDialect {};
    let clause =
        parse_with_clause_only("WITH a AS (SELECT 1), b AS (SELECT * FROM a);", &dialect).unwrap();
    assert_eq!(clause.len(), 2);

    let recursive = parse_with_clause_only(
        "WITH RECURSIVE n AS (SELECT 1 AS i UNION ALL SELECT i + 1 FROM n WHERE i < 5)",
        &dialect,
    )
    .unwrap();
    assert!(recursive.recursive);

    assert!(parse_with_clause_only("a AS (SELECT 1)", &dialect).is_err());
    assert!(parse_with_clause_only("WITH a AS (SELECT 1) SELECT * FROM a", &dialect).is_err());
}

#[test]
fn test_parse_with_strategies_falls_back_to_full_statement() {
    let dialect = GenericDialect {};

    let bare = parse_with_strategies("WITH a AS (SELECT 1)", &dialect).unwrap();
    assert_eq!(bare.method, ParseMethod::BareWithClause);

    let full = parse_with_strategies("WITH a AS (SELECT 1) SELECT * FROM a", &dialect).unwrap();
    assert_eq!(full.method, ParseMethod::FullStatement);
    assert_eq!(full.clause.names(), vec!["a".to_string()]);

    let failures = parse_with_strategies("WITH a AS (SELEC", &dialect).unwrap_err();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].method, ParseMethod::BareWithClause);
    assert_eq!(failures[1].method, ParseMethod::FullStatement);
}

#[test]
fn test_full_statement_without_with_is_a_failure() {
    let failures = parse_with_strategies("SELECT 1", &GenericDialect {}).unwrap_err();
    assert!(failures[1].message.contains("no WITH clause"));
}

#[test]
fn test_referenced_tables_from_and_joins() {
    let query = parse_query(
        "SELECT * FROM users u JOIN orders o ON u.id = o.user_id LEFT JOIN sales.refunds r ON r.order_id = o.id",
        &PostgreSqlDialect {},
    )
    .unwrap();
    assert_eq!(
        names(&referenced_tables(&query)),
        vec!["users", "orders", "sales.refunds"]
    );
}

#[test]
fn test_referenced_tables_subqueries() {
    let query = parse_query(
        "SELECT name, (SELECT MAX(total) FROM invoices) AS top FROM users \
         WHERE id IN (SELECT user_id FROM favorites) \
         AND EXISTS (SELECT 1 FROM bans WHERE bans.user_id = users.id)",
        &GenericDialect {},
    )
    .unwrap();
    let refs = referenced_tables(&query);
    for expected in ["users", "invoices", "favorites", "bans"] {
        assert!(refs.contains(expected), "missing {}", expected);
    }
}

#[test]
fn test_referenced_tables_derived_and_set_operations() {
    let query = parse_query(
        "SELECT * FROM (SELECT id FROM a UNION ALL SELECT id FROM b) AS u",
        &GenericDialect {},
    )
    .unwrap();
    assert_eq!(names(&referenced_tables(&query)), vec!["a", "b"]);
}

#[test]
fn test_referenced_tables_skip_nested_cte_names() {
    let query = parse_query(
        "WITH inner_cte AS (SELECT * FROM raw_events) SELECT * FROM inner_cte JOIN lookup ON true",
        &GenericDialect {},
    )
    .unwrap();
    assert_eq!(names(&referenced_tables(&query)), vec!["raw_events", "lookup"]);
}

#[test]
fn test_infer_columns() {
    let query = parse_query(
        "WITH a AS (SELECT id, t.name, COUNT(*) AS c FROM t GROUP BY id, t.name), \
         b(x, y) AS (SELECT 1, 2), \
         c AS (SELECT * FROM a), \
         d AS (SELECT id + 1 FROM a) \
         SELECT 1",
        &GenericDialect {},
    )
    .unwrap();
    let with = to_simple_query(query).with_clause.unwrap();
    assert_eq!(infer_columns(&with.tables[0]), vec!["id", "name", "c"]);
    assert_eq!(infer_columns(&with.tables[1]), vec!["x", "y"]);
    assert!(infer_columns(&with.tables[2]).is_empty());
    assert!(infer_columns(&with.tables[3]).is_empty());
}

#[test]
fn test_referenced_tables_in_join_conditions_and_ordering() {
    let query = parse_query(
        "SELECT t.id FROM t JOIN u ON u.id IN (SELECT id FROM allowed) \
         WHERE t.name ILIKE (SELECT pattern FROM patterns) \
         ORDER BY (SELECT MAX(rank) FROM ranks)",
        &PostgreSqlDialect {},
    )
    .unwrap();
    assert_eq!(
        names(&referenced_tables(&query)),
        vec!["t", "u", "allowed", "patterns", "ranks"]
    );
}
