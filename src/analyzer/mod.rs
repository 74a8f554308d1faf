//! Derived edges and whole-map diagnostics over a [`FragmentMap`].

use crate::fragment::FragmentMap;
use std::collections::HashSet;

/// Returns a copy of `fragments` whose `dependents` are the exact inverse of
/// every fragment's `dependencies`. Dependencies themselves are not touched.
pub fn analyze_dependents(fragments: &FragmentMap) -> FragmentMap {
    let mut analyzed = fragments.clone();
    annotate_dependents(&mut analyzed);
    analyzed
}

/// In-place form of [`analyze_dependents`].
pub fn annotate_dependents(fragments: &mut FragmentMap) {
    let edges: Vec<(String, String)> = fragments
        .iter()
        .flat_map(|fragment| {
            fragment
                .dependencies
                .iter()
                .map(move |dependency| (dependency.clone(), fragment.name.clone()))
        })
        .collect();

    for fragment in fragments.iter_mut() {
        fragment.dependents.clear();
    }

    for (dependency, dependent) in edges {
        // Unknown names are ordinary tables
        if let Some(target) = fragments.get_mut(&dependency) {
            target.dependents.insert(dependent);
        }
    }
}

struct CycleSearch<'a> {
    fragments: &'a FragmentMap,
    visited: HashSet<&'a str>,
    on_stack: HashSet<&'a str>,
    stack: Vec<&'a str>,
    cycles: Vec<Vec<String>>,
}

impl<'a> CycleSearch<'a> {
    fn visit(&mut self, name: &'a str) {
        let fragments = self.fragments;
        self.visited.insert(name);
        self.on_stack.insert(name);
        self.stack.push(name);

        if let Some(fragment) = fragments.get(name) {
            for dependency in &fragment.dependencies {
                let dependency = dependency.as_str();
                if !fragments.contains(dependency) {
                    continue;
                }
                if self.on_stack.contains(dependency) {
                    let start = self
                        .stack
                        .iter()
                        .position(|entry| *entry == dependency)
                        .unwrap_or(0);
                    let mut path: Vec<String> =
                        self.stack[start..].iter().map(|entry| entry.to_string()).collect();
                    path.push(dependency.to_string());
                    self.cycles.push(path);
                } else if !self.visited.contains(dependency) {
                    self.visit(dependency);
                }
            }
        }

        self.stack.pop();
        self.on_stack.remove(name);
    }
}

/// Every back-edge found by a depth-first walk over the whole map, as the
/// list of names along the cycle (first and last entries are equal).
///
/// Recursion depth is bounded by the longest dependency chain.
pub fn find_cycle_paths(fragments: &FragmentMap) -> Vec<Vec<String>> {
    let mut search = CycleSearch {
        fragments,
        visited: HashSet::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        cycles: Vec::new(),
    };

    for name in fragments.names() {
        if !search.visited.contains(name) {
            search.visit(name);
        }
    }

    search.cycles
}

/// Human-readable cycles, e.g. `a -> b -> c -> a`.
pub fn find_circular_dependencies(fragments: &FragmentMap) -> Vec<String> {
    find_cycle_paths(fragments)
        .into_iter()
        .map(|path| path.join(" -> "))
        .collect()
}

#[cfg(test)]
mod tests;
