use super::*;
use crate::workspace::FragmentOverrides;

const SQL: &str = "WITH a AS (SELECT 1 AS x), b AS (SELECT x FROM a) SELECT * FROM b";

#[tokio::test]
async fn test_open_list_close() {
    let store = WorkspaceStore::default();
    let ws = open_workspace(&store, "first".to_string(), SQL.to_string(), None)
        .await
        .unwrap();

    let listed = list_workspaces(&store).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, ws.id);
    assert_eq!(listed[0].fragment_count, 2);

    close_workspace(&store, ws.id.clone()).await.unwrap();
    assert!(list_workspaces(&store).await.unwrap().is_empty());
    let err = close_workspace(&store, ws.id.clone()).await.unwrap_err();
    assert!(err.starts_with("Workspace not found"));
}

#[tokio::test]
async fn test_open_invalid_sql() {
    let store = WorkspaceStore::default();
    let err = open_workspace(&store, "bad".to_string(), "WITH a AS (SELEC".to_string(), None)
        .await
        .unwrap_err();
    assert!(err.starts_with("failed to parse source query"));
}

#[tokio::test]
async fn test_edit_refresh_and_recompose() {
    let store = WorkspaceStore::default();
    let id = open_workspace(&store, "w".to_string(), SQL.to_string(), None)
        .await
        .unwrap()
        .id;

    let edited = update_fragment(&store, id.clone(), "a".to_string(), "SELECT 5 AS x".to_string())
        .await
        .unwrap();
    assert_eq!(edited.query, "SELECT 5 AS x");

    let fragments = refresh_workspace(&store, id.clone()).await.unwrap();
    assert!(fragments.get("a").unwrap().dependents.contains("b"));

    let sql = recompose_workspace(&store, id.clone()).await.unwrap();
    assert_eq!(
        sql,
        "WITH\n    a AS (SELECT 5 AS x),\n    b AS (SELECT x FROM a)\nSELECT * FROM b"
    );
    assert!(workspace_cycles(&store, id.clone()).await.unwrap().is_empty());

    let err = update_fragment(&store, id, "zzz".to_string(), "SELECT 1".to_string())
        .await
        .unwrap_err();
    assert_eq!(err, "fragment not found: zzz");
}

#[tokio::test]
async fn test_standalone_with_overrides() {
    let store = WorkspaceStore::default();
    let id = open_workspace(&store, "w".to_string(), SQL.to_string(), None)
        .await
        .unwrap()
        .id;

    set_fragment_overrides(
        &store,
        id.clone(),
        "b".to_string(),
        FragmentOverrides {
            test_data: Some("SELECT 3 AS x".to_string()),
            filter: None,
        },
    )
    .await
    .unwrap();

    let sql = standalone_fragment_sql(&store, id.clone(), "b".to_string())
        .await
        .unwrap();
    assert_eq!(
        sql,
        "WITH a AS (\n    SELECT 1 AS x\n),\nb AS (\n    SELECT 3 AS x\n)\nSELECT * FROM b"
    );

    let fragments = get_fragments(&store, id).await.unwrap();
    assert_eq!(fragments.get("b").unwrap().query, "SELECT x FROM a");
}

#[tokio::test]
async fn test_stateless_commands() {
    let composed = compose_sql(
        "SELECT x FROM a".to_string(),
        "a AS (SELECT 1 AS x)".to_string(),
        Some(ComposerConfig {
            format_output: false,
            ..ComposerConfig::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(composed, "WITH a AS (SELECT 1 AS x) SELECT x FROM a");

    assert_eq!(count_cte_definitions("a AS (SELECT 1), b AS (SELECT 2)".to_string()).await.unwrap(), 2);
    assert_eq!(count_cte_definitions(String::new()).await.unwrap(), 0);

    let main = isolate_main_query_text("WITH a AS (SELECT 1) SELECT * FROM a".to_string())
        .await
        .unwrap();
    assert_eq!(main, "SELECT * FROM a");
}
