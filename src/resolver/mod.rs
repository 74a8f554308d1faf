//! Standalone execution of a single fragment: the fragment plus everything it
//! transitively depends on, in dependency order.

use crate::error::{CteError, Result};
use crate::fragment::{render_identifier, Fragment, FragmentMap};
use indexmap::IndexSet;
use std::collections::HashSet;

/// Indentation of fragment bodies inside `name AS (...)`.
pub const STANDALONE_INDENT: usize = 4;

struct Resolution<'a> {
    fragments: &'a FragmentMap,
    visiting: IndexSet<&'a str>, // active recursion path
    visited: HashSet<&'a str>,
    order: Vec<String>,
}

impl<'a> Resolution<'a> {
    fn visit(&mut self, name: &'a str) -> Result<()> {
        if self.visited.contains(name) {
            return Ok(());
        }
        if let Some(start) = self.visiting.get_index_of(name) {
            let mut path: Vec<String> = self
                .visiting
                .iter()
                .skip(start)
                .map(|entry| entry.to_string())
                .collect();
            path.push(name.to_string());
            return Err(CteError::CircularDependency(path));
        }

        let fragments = self.fragments;
        let Some(fragment) = fragments.get(name) else {
            return Ok(());
        };

        self.visiting.insert(name);
        for dependency in &fragment.dependencies {
            if fragments.contains(dependency) {
                self.visit(dependency)?;
            }
        }
        self.visiting.pop();

        self.visited.insert(name);
        self.order.push(name.to_string());
        Ok(())
    }
}

/// Names needed to run `target` on its own, dependencies first and `target`
/// last. Names missing from the map are skipped; a cycle reachable from
/// `target` fails with [`CteError::CircularDependency`].
///
/// Uses one stack frame per link in the longest dependency chain.
pub fn resolve_order(target: &str, fragments: &FragmentMap) -> Result<Vec<String>> {
    let root = fragments.require(target)?;

    let mut resolution = Resolution {
        fragments,
        visiting: IndexSet::new(),
        visited: HashSet::new(),
        order: Vec::new(),
    };
    resolution.visit(root.name.as_str())?;

    log::debug!("resolved '{}' as {:?}", target, resolution.order);
    Ok(resolution.order)
}

/// Dependency-safe order for the whole map. Fragments already written after
/// their dependencies keep their relative order.
pub fn resolve_all(fragments: &FragmentMap) -> Result<Vec<String>> {
    let mut resolution = Resolution {
        fragments,
        visiting: IndexSet::new(),
        visited: HashSet::new(),
        order: Vec::with_capacity(fragments.len()),
    };
    for fragment in fragments.iter() {
        resolution.visit(fragment.name.as_str())?;
    }
    Ok(resolution.order)
}

/// Builds the SQL for an already resolved `order`. `body_for` supplies each
/// fragment's body, which lets callers substitute test data or filters.
///
/// A single non-recursive fragment is returned as its bare body; otherwise
/// every fragment becomes a CTE and the statement selects everything from
/// `target`.
pub fn render_standalone<F>(
    target: &str,
    order: &[String],
    fragments: &FragmentMap,
    body_for: F,
) -> Result<String>
where
    F: Fn(&Fragment) -> String,
{
    let listed = order
        .iter()
        .map(|name| fragments.require(name))
        .collect::<Result<Vec<&Fragment>>>()?;
    let recursive = listed.iter().any(|fragment| fragment.recursive);

    if let [only] = listed.as_slice() {
        if !recursive {
            return Ok(body_for(*only));
        }
    }

    let definitions = listed
        .iter()
        .map(|fragment| fragment.to_cte_definition(&body_for(*fragment), STANDALONE_INDENT))
        .collect::<Vec<String>>()
        .join(",\n");

    Ok(format!(
        "WITH {}{}\nSELECT * FROM {}",
        if recursive { "RECURSIVE " } else { "" },
        definitions,
        render_identifier(target)
    ))
}

/// SQL that runs `target` standalone with every fragment's own query text.
pub fn resolve_for_standalone_execution(target: &str, fragments: &FragmentMap) -> Result<String> {
    let order = resolve_order(target, fragments)?;
    render_standalone(target, &order, fragments, |fragment| fragment.query.clone())
}
