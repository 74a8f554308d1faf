use super::*;
use crate::fragment::Fragment;

fn fragment(name: &str, deps: &[&str]) -> Fragment {
    Fragment::new(name, format!("SELECT * FROM {}_source", name))
        .with_dependencies(deps.iter().copied())
}

fn dependents_of<'a>(fragments: &'a FragmentMap, name: &str) -> Vec<&'a str> {
    fragments
        .get(name)
        .unwrap()
        .dependents
        .iter()
        .map(String::as_str)
        .collect()
}

#[test]
fn test_dependents_are_inverse_of_dependencies() {
    let fragments = FragmentMap::from_iter(vec![
        fragment("base", &[]),
        fragment("left", &["base"]),
        fragment("right", &["base"]),
        fragment("top", &["left", "right"]),
    ]);
    let analyzed = analyze_dependents(&fragments);

    assert_eq!(dependents_of(&analyzed, "base"), vec!["left", "right"]);
    assert_eq!(dependents_of(&analyzed, "left"), vec!["top"]);
    assert_eq!(dependents_of(&analyzed, "right"), vec!["top"]);
    assert!(dependents_of(&analyzed, "top").is_empty());

    for fragment in analyzed.iter() {
        assert_eq!(
            fragment.dependencies,
            fragments.get(&fragment.name).unwrap().dependencies
        );
    }
}

#[test]
fn test_dangling_dependencies_are_ignored() {
    let fragments = FragmentMap::from_iter(vec![
        fragment("x", &["orders", "not_a_cte"]),
    ]);
    let analyzed = analyze_dependents(&fragments);
    assert_eq!(analyzed.len(), 1);
    assert!(dependents_of(&analyzed, "x").is_empty());
}

#[test]
fn test_annotate_replaces_stale_dependents() {
    let mut fragments = FragmentMap::from_iter(vec![
        fragment("a", &[]),
        fragment("b", &["a"]),
    ]);
    annotate_dependents(&mut fragments);
    assert_eq!(dependents_of(&fragments, "a"), vec!["b"]);

    fragments.get_mut("b").unwrap().dependencies.clear();
    annotate_dependents(&mut fragments);
    assert!(dependents_of(&fragments, "a").is_empty());
}

#[test]
fn test_find_circular_dependencies() {
    let fragments = FragmentMap::from_iter(vec![
        fragment("a", &["b"]),
        fragment("b", &["c"]),
        fragment("c", &["a"]),
        fragment("d", &[]),
    ]);
    let cycles = find_circular_dependencies(&fragments);
    assert_eq!(cycles, vec!["a -> b -> c -> a".to_string()]);
}

#[test]
fn test_find_self_cycle_and_acyclic() {
    let looped = FragmentMap::from_iter(vec![
        fragment("a", &["a"]),
    ]);
    assert_eq!(find_circular_dependencies(&looped), vec!["a -> a".to_string()]);

    let acyclic = FragmentMap::from_iter(vec![
        fragment("a", &[]),
        fragment("b", &["a"]),
        fragment("c", &["a", "b"]),
    ]);
    assert!(find_circular_dependencies(&acyclic).is_empty());
}

#[test]
fn test_cycle_found_from_later_entry() {
    let fragments = FragmentMap::from_iter(vec![
        fragment("entry", &["x"]),
        fragment("x", &["y"]),
        fragment("y", &["x"]),
    ]);
    let paths = find_cycle_paths(&fragments);
    assert_eq!(paths, vec![vec!["x".to_string(), "y".to_string(), "x".to_string()]]);
}
