use crate::error::{CteError, Result};
use crate::sql_text::is_plain_identifier;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// One decomposed CTE: an independently editable named query body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub query: String, // own body only, never an outer WITH
    pub dependencies: IndexSet<String>,
    #[serde(default)]
    pub dependents: IndexSet<String>,
    #[serde(default)]
    pub tables: IndexSet<String>, // referenced names that are not siblings
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub recursive: bool,
}

impl Fragment {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            tables: IndexSet::new(),
            columns: Vec::new(),
            comment: None,
            recursive: false,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }

    /// `name AS (\n<body>\n)` with the body indented by `indent` spaces.
    /// A trailing semicolon on the body is dropped.
    pub fn to_cte_definition(&self, body: &str, indent: usize) -> String {
        let body = body.trim().trim_end_matches(';').trim_end();
        format!(
            "{} AS (\n{}\n)",
            render_identifier(&self.name),
            crate::sql_text::indent_lines(body, indent)
        )
    }
}

/// Fragments keyed by name, in the order their CTEs were written.
///
/// Dependency edges are computed when fragments are extracted. Editing a
/// fragment's query through [`FragmentMap::update_query`] does not touch any
/// edge; callers re-run `refresh_dependencies` when they want the graph to
/// follow the new text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct FragmentMap {
    fragments: IndexMap<String, Fragment>,
}

impl FragmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fragment, replacing any existing fragment of the same name in
    /// place. Returns the replaced fragment.
    pub fn insert(&mut self, fragment: Fragment) -> Option<Fragment> {
        self.fragments.insert(fragment.name.clone(), fragment)
    }

    pub fn get(&self, name: &str) -> Option<&Fragment> {
        self.fragments.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Fragment> {
        self.fragments.get_mut(name)
    }

    pub fn require(&self, name: &str) -> Result<&Fragment> {
        self.get(name)
            .ok_or_else(|| CteError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    /// Removes a fragment and keeps the order of the remaining ones.
    pub fn remove(&mut self, name: &str) -> Option<Fragment> {
        self.fragments.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Fragment> {
        self.fragments.values_mut()
    }

    pub fn update_query(&mut self, name: &str, query: impl Into<String>) -> Result<()> {
        let fragment = self
            .fragments
            .get_mut(name)
            .ok_or_else(|| CteError::NotFound(name.to_string()))?;
        fragment.query = query.into();
        Ok(())
    }
}

impl FromIterator<Fragment> for FragmentMap {
    fn from_iter<T: IntoIterator<Item = Fragment>>(iter: T) -> Self {
        let mut map = FragmentMap::new();
        for fragment in iter {
            map.insert(fragment);
        }
        map
    }
}

impl<'a> IntoIterator for &'a FragmentMap {
    type Item = &'a Fragment;
    type IntoIter = indexmap::map::Values<'a, String, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.values()
    }
}

/// The statement that follows the WITH clause of a decomposed query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MainQuery {
    pub text: String,
    pub with_clause_already_present: bool,
}

/// Quotes a fragment name when it is not a plain identifier.
pub fn render_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
