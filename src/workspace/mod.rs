//! A decomposed query kept open for editing: its fragments, the main query
//! and per-fragment overrides used when running fragments on their own.

use crate::analyzer::{annotate_dependents, find_circular_dependencies};
use crate::composer::CteComposer;
use crate::config::ComposerConfig;
use crate::error::{CteError, Result};
use crate::extractor::{self, decompose};
use crate::fragment::{render_identifier, Fragment, FragmentMap, MainQuery};
use crate::graph::{FragmentGraph, FragmentGraphData};
use crate::resolver::{render_standalone, resolve_all, resolve_order, STANDALONE_INDENT};
use crate::sql_text::{starts_with_keyword, strip_leading_comments};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Substitutions applied when a fragment runs standalone. They never reach
/// the recomposed query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FragmentOverrides {
    pub test_data: Option<String>, // replaces the body
    pub filter: Option<String>,    // WHERE condition over the body's rows
}

impl FragmentOverrides {
    pub fn is_empty(&self) -> bool {
        self.test_data.is_none() && self.filter.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub source_sql: String,
    pub main_query: MainQuery,
    pub fragments: FragmentMap,
    pub overrides: IndexMap<String, FragmentOverrides>,
    pub config: ComposerConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn decompose(name: impl Into<String>, sql: &str, config: ComposerConfig) -> Result<Self> {
        let decomposition = decompose(sql, config.dialect)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            source_sql: sql.to_string(),
            main_query: decomposition.main_query,
            fragments: decomposition.fragments,
            overrides: IndexMap::new(),
            config,
            created_at: now,
            updated_at: now,
        })
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replaces a fragment's query text. Edges stay as they were until
    /// [`refresh_dependencies`](Self::refresh_dependencies) runs.
    pub fn edit_fragment(&mut self, name: &str, query: impl Into<String>) -> Result<()> {
        self.fragments.update_query(name, query)?;
        self.touch();
        Ok(())
    }

    pub fn set_comment(&mut self, name: &str, comment: Option<String>) -> Result<()> {
        let fragment = self
            .fragments
            .get_mut(name)
            .ok_or_else(|| CteError::NotFound(name.to_string()))?;
        fragment.comment = comment.filter(|c| !c.trim().is_empty());
        self.touch();
        Ok(())
    }

    /// Appends a new fragment and derives its edges from `query`. Fragments
    /// that already named it as a table pick it up on the next refresh.
    pub fn add_fragment(&mut self, name: &str, query: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CteError::InvalidFragment(
                "fragment name cannot be empty".to_string(),
            ));
        }
        if self.fragments.names().any(|existing| existing.eq_ignore_ascii_case(name)) {
            return Err(CteError::InvalidFragment(format!(
                "a fragment named '{}' already exists",
                name
            )));
        }

        self.fragments.insert(Fragment::new(name, query));
        if let Err(e) = extractor::refresh_fragment(&mut self.fragments, name, self.config.dialect) {
            self.fragments.remove(name);
            return Err(e);
        }

        log::debug!("added fragment '{}' to workspace '{}'", name, self.name);
        self.touch();
        Ok(())
    }

    /// Removes a fragment and its overrides. Returns the fragments that read
    /// it directly or transitively; their queries are left as they are.
    pub fn remove_fragment(&mut self, name: &str) -> Result<Vec<String>> {
        self.fragments.require(name)?;

        let impacted = FragmentGraph::from_fragments(&self.fragments, false).impacted_by(name);
        self.fragments.remove(name);
        self.overrides.shift_remove(name);
        annotate_dependents(&mut self.fragments);

        if !impacted.is_empty() {
            log::warn!(
                "removed fragment '{}' still referenced by {:?}",
                name,
                impacted
            );
        }
        self.touch();
        Ok(impacted)
    }

    pub fn set_overrides(&mut self, name: &str, overrides: FragmentOverrides) -> Result<()> {
        self.fragments.require(name)?;
        if overrides.is_empty() {
            self.overrides.shift_remove(name);
        } else {
            self.overrides.insert(name.to_string(), overrides);
        }
        self.touch();
        Ok(())
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
        self.touch();
    }

    pub fn refresh_dependencies(&mut self) -> Result<()> {
        extractor::refresh_dependencies(&mut self.fragments, self.config.dialect)?;
        self.touch();
        Ok(())
    }

    /// Replaces the main query text.
    pub fn set_main_query(&mut self, text: impl Into<String>) {
        let text = text.into();
        let with_clause_already_present = starts_with_keyword(strip_leading_comments(&text), "WITH");
        self.main_query = MainQuery {
            text,
            with_clause_already_present,
        };
        self.touch();
    }

    /// Body used for `fragment` in standalone runs, with overrides applied.
    pub fn effective_body(&self, fragment: &Fragment) -> String {
        let Some(overrides) = self.overrides.get(&fragment.name) else {
            return fragment.query.clone();
        };

        let body = overrides
            .test_data
            .clone()
            .unwrap_or_else(|| fragment.query.clone());
        match overrides.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => format!(
                "SELECT * FROM (\n{}\n) AS {} WHERE {}",
                body.trim().trim_end_matches(';').trim_end(),
                render_identifier(&format!("{}_filtered", fragment.name)),
                filter
            ),
            _ => body,
        }
    }

    /// SQL that runs one fragment with everything it needs, overrides applied.
    pub fn standalone_sql(&self, name: &str) -> Result<String> {
        let order = resolve_order(name, &self.fragments)?;
        render_standalone(name, &order, &self.fragments, |fragment| {
            self.effective_body(fragment)
        })
    }

    /// The full query rebuilt from the main query and every fragment's
    /// current text, dependencies first. Overrides are not applied.
    pub fn recompose(&self) -> Result<String> {
        let order = resolve_all(&self.fragments)?;
        let listed = order
            .iter()
            .map(|name| self.fragments.require(name))
            .collect::<Result<Vec<&Fragment>>>()?;
        if listed.is_empty() {
            return Ok(self.main_query.text.clone());
        }

        let recursive = listed.iter().any(|fragment| fragment.recursive);
        let definitions = listed
            .iter()
            .map(|fragment| fragment.to_cte_definition(&fragment.query, STANDALONE_INDENT))
            .collect::<Vec<String>>()
            .join(",\n");
        let cte_definitions = format!(
            "WITH {}{}",
            if recursive { "RECURSIVE " } else { "" },
            definitions
        );

        CteComposer::new(self.config.clone()).compose(&self.main_query.text, &cte_definitions)
    }

    pub fn circular_dependencies(&self) -> Vec<String> {
        find_circular_dependencies(&self.fragments)
    }

    pub fn graph_data(&self, include_tables: bool) -> FragmentGraphData {
        FragmentGraph::from_fragments(&self.fragments, include_tables).to_data()
    }
}
