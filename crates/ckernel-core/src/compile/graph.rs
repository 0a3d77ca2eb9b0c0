//! Link dependency graph.

use std::path::PathBuf;

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};

/// Something a link target can require.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkNode {
    /// A saved compilation unit, by target name.
    Unit(String),
    /// An object file that exists on disk but belongs to no cell.
    External(PathBuf),
}

impl std::fmt::Display for LinkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkNode::Unit(name) => write!(f, "{name}"),
            LinkNode::External(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Directed graph whose edges go from a target to the objects it requires.
#[derive(Debug, Default)]
pub struct LinkGraph {
    graph: DiGraph<LinkNode, ()>,
    node_indices: FxHashMap<LinkNode, NodeIndex>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning the existing index if it is already present.
    pub fn add_node(&mut self, node: LinkNode) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.node_indices.insert(node, idx);
        idx
    }

    /// Record that `target` requires `requirement`.
    pub fn add_requirement(&mut self, target: &LinkNode, requirement: &LinkNode) {
        let from = self.add_node(target.clone());
        let to = self.add_node(requirement.clone());
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    pub fn contains(&self, node: &LinkNode) -> bool {
        self.node_indices.contains_key(node)
    }

    /// Detect cycles and return a helpful error message.
    pub fn detect_cycles(&self) -> Result<()> {
        use petgraph::algo::kosaraju_scc;

        for scc in kosaraju_scc(&self.graph) {
            let is_cycle = scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if is_cycle {
                let names: Vec<String> = scc.iter().map(|&idx| self.graph[idx].to_string()).collect();
                return Err(Error::CyclicDependency(format!(
                    "{} → {}",
                    names.join(" → "),
                    names[0]
                )));
            }
        }

        Ok(())
    }

    /// Everything `root` requires, directly or transitively, in declaration
    /// order (depth first, each node once, `root` excluded).
    pub fn requirements(&self, root: &LinkNode) -> Vec<LinkNode> {
        let Some(&root_idx) = self.node_indices.get(root) else {
            return Vec::new();
        };

        let mut visited = FxHashSet::default();
        visited.insert(root_idx);
        let mut order = Vec::new();
        let mut stack = self.ordered_neighbors(root_idx);
        stack.reverse();

        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            order.push(self.graph[idx].clone());
            let mut next = self.ordered_neighbors(idx);
            next.reverse();
            stack.extend(next);
        }

        order
    }

    /// Neighbors in the order their edges were added.
    fn ordered_neighbors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        // petgraph lists the most recently added edge first
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        neighbors.reverse();
        neighbors
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> LinkNode {
        LinkNode::Unit(name.to_string())
    }

    #[test]
    fn test_requirements_in_declaration_order() {
        let mut graph = LinkGraph::new();
        graph.add_requirement(&unit("main"), &unit("util"));
        graph.add_requirement(&unit("main"), &unit("io"));
        graph.add_requirement(&unit("util"), &unit("mathx"));

        let order = graph.requirements(&unit("main"));
        assert_eq!(order, vec![unit("util"), unit("mathx"), unit("io")]);
        assert!(graph.detect_cycles().is_ok());
    }

    #[test]
    fn test_shared_requirement_listed_once() {
        let mut graph = LinkGraph::new();
        graph.add_requirement(&unit("main"), &unit("a"));
        graph.add_requirement(&unit("main"), &unit("b"));
        graph.add_requirement(&unit("a"), &unit("common"));
        graph.add_requirement(&unit("b"), &unit("common"));

        let order = graph.requirements(&unit("main"));
        assert_eq!(order, vec![unit("a"), unit("common"), unit("b")]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = LinkGraph::new();
        graph.add_requirement(&unit("a"), &unit("b"));
        graph.add_requirement(&unit("b"), &unit("a"));

        let err = graph.detect_cycles().unwrap_err();
        assert!(matches!(err, Error::CyclicDependency(_)));
    }

    #[test]
    fn test_self_requirement_is_cycle() {
        let mut graph = LinkGraph::new();
        graph.add_requirement(&unit("main"), &unit("main"));
        assert!(graph.detect_cycles().is_err());
    }

    #[test]
    fn test_external_nodes() {
        let mut graph = LinkGraph::new();
        let ext = LinkNode::External(PathBuf::from("/opt/lib/blas.o"));
        graph.add_requirement(&unit("main"), &ext);

        assert!(graph.contains(&ext));
        assert_eq!(graph.requirements(&unit("main")), vec![ext]);
        assert_eq!(graph.len(), 2);
    }
}
