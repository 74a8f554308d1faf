use crate::error::{CteError, Result};
use crate::fragment::FragmentMap;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Fragment,
    Table, // referenced but not defined in the workspace
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyLink {
    pub source: String, // the fragment whose query reads `target`
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentGraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<DependencyLink>,
    pub cycles: Vec<Vec<String>>,
}

/// Directed graph with an edge `A -> B` whenever fragment A reads B.
pub struct FragmentGraph {
    pub graph: DiGraph<GraphNode, ()>,
    node_indices: HashMap<String, NodeIndex>,
    edge_keys: HashSet<(NodeIndex, NodeIndex)>,
}

impl Default for FragmentGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            edge_keys: HashSet::new(),
        }
    }

    /// Builds the graph from the current `dependencies` of every fragment.
    /// With `include_tables`, external tables become leaf nodes too.
    pub fn from_fragments(fragments: &FragmentMap, include_tables: bool) -> Self {
        let mut graph = Self::new();
        for fragment in fragments.iter() {
            graph.add_node(&fragment.name, NodeKind::Fragment);
        }

        for fragment in fragments.iter() {
            for dependency in &fragment.dependencies {
                graph.add_edge(&fragment.name, dependency);
            }
            if include_tables {
                for table in &fragment.tables {
                    graph.add_node(table, NodeKind::Table);
                    graph.add_edge(&fragment.name, table);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> NodeIndex {
        if let Some(idx) = self.node_indices.get(id) {
            return *idx;
        }
        let index = self.graph.add_node(GraphNode {
            id: id.to_string(),
            kind,
        });
        self.node_indices.insert(id.to_string(), index);
        index
    }

    /// Adds `source -> target`. Unknown endpoints are ignored, matching how
    /// dangling references are treated everywhere else.
    pub fn add_edge(&mut self, source_id: &str, target_id: &str) {
        let (Some(source_idx), Some(target_idx)) = (
            self.node_indices.get(source_id).copied(),
            self.node_indices.get(target_id).copied(),
        ) else {
            return;
        };

        if !self.edge_keys.insert((source_idx, target_idx)) {
            return;
        }
        self.graph.add_edge(source_idx, target_idx, ());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn id_of(&self, idx: NodeIndex) -> String {
        self.graph[idx].id.clone()
    }

    pub fn to_data(&self) -> FragmentGraphData {
        let nodes = self
            .graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect();

        let edges = self
            .graph
            .edge_references()
            .map(|edge| DependencyLink {
                source: self.id_of(edge.source()),
                target: self.id_of(edge.target()),
            })
            .collect();

        FragmentGraphData {
            nodes,
            edges,
            cycles: self.find_cycles(),
        }
    }

    /// Groups of fragments that depend on each other. An SCC with more than one
    /// node is a cycle, and so is a single node with a self loop.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycle_groups = Vec::new();

        for scc in algo::tarjan_scc(&self.graph) {
            if scc.len() > 1 {
                let mut ids: Vec<String> = scc.iter().map(|idx| self.id_of(*idx)).collect();
                ids.sort();
                cycle_groups.push(ids);
            } else if let [idx] = scc.as_slice() {
                if self.graph.contains_edge(*idx, *idx) {
                    cycle_groups.push(vec![self.id_of(*idx)]);
                }
            }
        }

        cycle_groups
    }

    /// Fragment order in which every fragment comes after what it reads, i.e.
    /// a safe order for writing them into one WITH clause.
    pub fn insertion_order(&self) -> Result<Vec<String>> {
        let mut order = self.removal_order()?;
        order.reverse();
        Ok(order)
    }

    /// Reverse of [`insertion_order`](Self::insertion_order): dependents first,
    /// so removing fragments in this order never leaves a dangling reader.
    pub fn removal_order(&self) -> Result<Vec<String>> {
        let sorted = algo::toposort(&self.graph, None).map_err(|cycle| {
            let start = cycle.node_id();
            let mut path = self
                .find_cycles()
                .into_iter()
                .find(|group| group.contains(&self.graph[start].id))
                .unwrap_or_else(|| vec![self.id_of(start)]);
            if let Some(first) = path.first().cloned() {
                path.push(first);
            }
            CteError::CircularDependency(path)
        })?;

        Ok(sorted
            .into_iter()
            .filter(|idx| self.graph[*idx].kind == NodeKind::Fragment)
            .map(|idx| self.id_of(idx))
            .collect())
    }

    /// Every fragment that reads `id` directly or transitively, nearest first.
    pub fn impacted_by(&self, id: &str) -> Vec<String> {
        let Some(start) = self.node_indices.get(id).copied() else {
            return Vec::new();
        };

        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut impacted = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors_directed(current, Direction::Incoming) {
                if seen.insert(next) {
                    impacted.push(self.id_of(next));
                    queue.push_back(next);
                }
            }
        }

        impacted
    }

    fn rebuild_node_index_cache(&mut self) {
        self.node_indices.clear();
        for idx in self.graph.node_indices() {
            self.node_indices.insert(self.graph[idx].id.clone(), idx);
        }
    }

    fn rebuild_edge_key_cache(&mut self) {
        self.edge_keys.clear();
        for edge in self.graph.edge_references() {
            self.edge_keys.insert((edge.source(), edge.target()));
        }
    }

    /// Keeps only nodes within `max_hops` of `center_id`, following edges in
    /// both directions. An unknown center leaves the graph unchanged.
    pub fn filter_neighborhood(&mut self, center_id: &str, max_hops: usize) {
        let Some(center_idx) = self.node_indices.get(center_id).copied() else {
            return;
        };

        let hop_budget = max_hops.max(1);
        let mut neighbors = HashSet::from([center_idx]);
        let mut queue = VecDeque::from([(center_idx, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= hop_budget {
                continue;
            }
            for direction in [Direction::Incoming, Direction::Outgoing] {
                for next in self.graph.neighbors_directed(current, direction) {
                    if neighbors.insert(next) {
                        queue.push_back((next, depth + 1));
                    }
                }
            }
        }

        self.graph.retain_nodes(|_, idx| neighbors.contains(&idx));
        self.rebuild_node_index_cache();
        self.rebuild_edge_key_cache();
    }
}
