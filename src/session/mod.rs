//! Async command surface for a UI layer. Each command takes the store lock
//! once, so a resolve or compose never sees a half-applied edit. Errors are
//! flattened to `String` at this boundary.

use crate::composer::CteComposer;
use crate::config::ComposerConfig;
use crate::error::Result as CteResult;
use crate::fragment::{Fragment, FragmentMap};
use crate::isolator::isolate_main_query;
use crate::workspace::{FragmentOverrides, Workspace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct WorkspaceStore {
    pub workspaces: Mutex<HashMap<String, Workspace>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkspaceSummary {
    pub id: String,
    pub name: String,
    pub fragment_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workspace> for WorkspaceSummary {
    fn from(workspace: &Workspace) -> Self {
        Self {
            id: workspace.id.clone(),
            name: workspace.name.clone(),
            fragment_count: workspace.fragments.len(),
            created_at: workspace.created_at,
            updated_at: workspace.updated_at,
        }
    }
}

async fn with_workspace<T, F>(store: &WorkspaceStore, workspace_id: &str, f: F) -> Result<T, String>
where
    F: FnOnce(&mut Workspace) -> CteResult<T>,
{
    let mut guard = store.workspaces.lock().await;
    let workspace = guard
        .get_mut(workspace_id)
        .ok_or_else(|| format!("Workspace not found: {}", workspace_id))?;
    f(workspace).map_err(|e| e.to_string())
}

pub async fn open_workspace(
    store: &WorkspaceStore,
    name: String,
    sql: String,
    config: Option<ComposerConfig>,
) -> Result<Workspace, String> {
    let workspace =
        Workspace::decompose(name, &sql, config.unwrap_or_default()).map_err(|e| e.to_string())?;
    log::debug!(
        "opened workspace {} with {} fragment(s)",
        workspace.id,
        workspace.fragments.len()
    );

    let mut guard = store.workspaces.lock().await;
    guard.insert(workspace.id.clone(), workspace.clone());
    Ok(workspace)
}

pub async fn list_workspaces(store: &WorkspaceStore) -> Result<Vec<WorkspaceSummary>, String> {
    let guard = store.workspaces.lock().await;
    let mut summaries: Vec<WorkspaceSummary> = guard.values().map(WorkspaceSummary::from).collect();
    summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(summaries)
}

pub async fn close_workspace(store: &WorkspaceStore, workspace_id: String) -> Result<(), String> {
    let mut guard = store.workspaces.lock().await;
    guard
        .remove(&workspace_id)
        .map(|_| ())
        .ok_or_else(|| format!("Workspace not found: {}", workspace_id))
}

pub async fn get_fragments(store: &WorkspaceStore, workspace_id: String) -> Result<FragmentMap, String> {
    with_workspace(store, &workspace_id, |workspace| Ok(workspace.fragments.clone())).await
}

pub async fn update_fragment(
    store: &WorkspaceStore,
    workspace_id: String,
    name: String,
    query: String,
) -> Result<Fragment, String> {
    with_workspace(store, &workspace_id, |workspace| {
        workspace.edit_fragment(&name, query)?;
        workspace.fragments.require(&name).cloned()
    })
    .await
}

pub async fn refresh_workspace(store: &WorkspaceStore, workspace_id: String) -> Result<FragmentMap, String> {
    with_workspace(store, &workspace_id, |workspace| {
        workspace.refresh_dependencies()?;
        Ok(workspace.fragments.clone())
    })
    .await
}

pub async fn set_fragment_overrides(
    store: &WorkspaceStore,
    workspace_id: String,
    name: String,
    overrides: FragmentOverrides,
) -> Result<(), String> {
    with_workspace(store, &workspace_id, |workspace| {
        workspace.set_overrides(&name, overrides)
    })
    .await
}

pub async fn standalone_fragment_sql(
    store: &WorkspaceStore,
    workspace_id: String,
    name: String,
) -> Result<String, String> {
    with_workspace(store, &workspace_id, |workspace| workspace.standalone_sql(&name)).await
}

pub async fn recompose_workspace(store: &WorkspaceStore, workspace_id: String) -> Result<String, String> {
    with_workspace(store, &workspace_id, |workspace| workspace.recompose()).await
}

pub async fn workspace_cycles(store: &WorkspaceStore, workspace_id: String) -> Result<Vec<String>, String> {
    with_workspace(store, &workspace_id, |workspace| {
        Ok(workspace.circular_dependencies())
    })
    .await
}

pub async fn compose_sql(
    main_query: String,
    cte_definitions: String,
    config: Option<ComposerConfig>,
) -> Result<String, String> {
    CteComposer::new(config.unwrap_or_default())
        .compose(&main_query, &cte_definitions)
        .map_err(|e| e.to_string())
}

pub async fn count_cte_definitions(cte_definitions: String) -> Result<usize, String> {
    Ok(CteComposer::default().count_ctes(&cte_definitions))
}

pub async fn isolate_main_query_text(sql: String) -> Result<String, String> {
    Ok(isolate_main_query(&sql))
}

#[cfg(test)]
mod tests;
