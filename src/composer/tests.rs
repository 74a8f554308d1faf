use super::*;
use crate::config::{SqlDialect, WithClauseStyle};
use crate::parser::parse_with_clause_only;
use sqlparser::dialect::GenericDialect;

fn unformatted() -> CteComposer {
    CteComposer::new(ComposerConfig {
        format_output: false,
        ..ComposerConfig::default()
    })
}

#[test]
fn test_empty_definitions_return_main_unchanged() {
    let main = "select  *\nfrom   orders -- untouched";
    assert_eq!(compose(main, "").unwrap(), main);
    assert_eq!(compose(main, "  \n\t").unwrap(), main);
    assert_eq!(unformatted().compose_with_ctes(main, &[]).unwrap(), main);
}

#[test]
fn test_compose_into_query_without_with() {
    let sql = compose("SELECT * FROM b", "a AS (SELECT 1 AS x), b AS (SELECT x FROM a)").unwrap();
    assert_eq!(
        sql,
        "WITH\n    a AS (SELECT 1 AS x),\n    b AS (SELECT x FROM a)\nSELECT * FROM b"
    );
}

#[test]
fn test_injected_ctes_come_before_existing_ones() {
    let sql = unformatted()
        .compose(
            "WITH b AS (SELECT x FROM a) SELECT * FROM b",
            "WITH a AS (SELECT 1 AS x)",
        )
        .unwrap();
    assert_eq!(
        sql,
        "WITH a AS (SELECT 1 AS x), b AS (SELECT x FROM a) SELECT * FROM b"
    );
}

#[test]
fn test_leading_comments_do_not_hide_missing_with() {
    let composer = unformatted();
    let expected = "WITH a AS (SELECT 1 AS x) SELECT x FROM a";

    assert_eq!(
        composer
            .compose("SELECT x FROM a", "-- WITH helpers\na AS (SELECT 1 AS x)")
            .unwrap(),
        expected
    );
    assert_eq!(
        composer
            .compose("SELECT x FROM a", "/* helpers */\nWITH a AS (SELECT 1 AS x)")
            .unwrap(),
        expected
    );
}

#[test]
fn test_normalize_definitions() {
    assert_eq!(normalize_definitions(" a AS (SELECT 1) "), "WITH a AS (SELECT 1)");
    assert_eq!(normalize_definitions("with a AS (SELECT 1)"), "with a AS (SELECT 1)");
    assert_eq!(
        normalize_definitions("-- note\nWITH a AS (SELECT 1)"),
        "-- note\nWITH a AS (SELECT 1)"
    );
    assert_eq!(
        normalize_definitions("withheld AS (SELECT 1)"),
        "WITH withheld AS (SELECT 1)"
    );
}

#[test]
fn test_full_statement_definitions() {
    let composer = unformatted();
    let parsed = composer
        .parse_definitions("WITH a AS (SELECT 1 AS x) SELECT * FROM a")
        .unwrap();
    assert_eq!(parsed.method, crate::parser::ParseMethod::FullStatement);

    let sql = composer
        .compose("SELECT x FROM a", "WITH a AS (SELECT 1 AS x) SELECT * FROM a")
        .unwrap();
    assert_eq!(sql, "WITH a AS (SELECT 1 AS x) SELECT x FROM a");
}

#[test]
fn test_unparseable_definitions() {
    let err = compose("SELECT 1", "a AS (SELEC 1)").unwrap_err();
    match err {
        CteError::Parse { input, message } => {
            assert_eq!(input, ParseInput::CteDefinitions);
            assert!(message.contains("bare WITH clause"));
            assert!(message.contains("complete query that begins with a WITH clause"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_unparseable_main_query() {
    let err = compose("SELEC * FROM a", "a AS (SELECT 1)").unwrap_err();
    assert!(matches!(
        err,
        CteError::Parse {
            input: ParseInput::MainQuery,
            ..
        }
    ));
}

#[test]
fn test_count_ctes_matches_compose() {
    let composer = CteComposer::default();
    assert_eq!(composer.count_ctes(""), 0);
    assert_eq!(composer.count_ctes("a AS (SELECT 1), b AS (SELECT 2)"), 2);
    assert_eq!(composer.count_ctes("-- c\nWITH a AS (SELECT 1)"), 1);
    assert_eq!(composer.count_ctes("WITH a AS (SELECT 1) SELECT * FROM a"), 1);
    assert_eq!(composer.count_ctes("not sql at all ((("), 0);
    assert_eq!(count_ctes("x AS (SELECT '(' AS p), y AS (SELECT 2)"), 2);
}

#[test]
fn test_self_referencing_cte_makes_clause_recursive() {
    let sql = unformatted()
        .compose(
            "SELECT i FROM n",
            "n AS (SELECT 1 AS i UNION ALL SELECT i + 1 FROM n WHERE i < 3)",
        )
        .unwrap();
    assert!(sql.starts_with("WITH RECURSIVE n AS ("));
}

#[test]
fn test_compose_with_parsed_ctes() {
    let clause = parse_with_clause_only("WITH a AS (SELECT 1 AS x)", &GenericDialect {}).unwrap();
    let ctes = clause.into_ctes();
    let sql = unformatted().compose_with_ctes("SELECT x FROM a", &ctes).unwrap();
    assert_eq!(sql, "WITH a AS (SELECT 1 AS x) SELECT x FROM a");
}

#[test]
fn test_formatting_styles_and_fallback() {
    let expanded = CteComposer::new(ComposerConfig {
        dialect: SqlDialect::PostgreSql,
        with_style: WithClauseStyle::Expanded,
        indent_width: 2,
        format_output: true,
    });
    let sql = expanded.compose("SELECT x FROM a", "a AS (SELECT 1 AS x)").unwrap();
    assert_eq!(sql, "WITH a AS (\n  SELECT 1 AS x\n)\nSELECT x FROM a");

    // Text that cannot be re-parsed comes back as-is
    let broken = "WITH a AS (SELECT 1".to_string();
    assert_eq!(CteComposer::default().finish(broken.clone()), broken);
}

#[test]
fn test_duplicate_names_are_kept() {
    let sql = unformatted()
        .compose("WITH a AS (SELECT 2 AS x) SELECT x FROM a", "a AS (SELECT 1 AS x)")
        .unwrap();
    assert_eq!(
        sql,
        "WITH a AS (SELECT 1 AS x), a AS (SELECT 2 AS x) SELECT x FROM a"
    );
}
