//! Staleness Propagator
//!
//! The graph stores, for every node, the edges recorded by its last
//! resolution. Edges are data: each resolution replaces the node's previous
//! edge set, so a variable whose dependency shape changed stops listening to
//! inputs it no longer reads.
//!
//! # Algorithm
//!
//! When a node's inputs change:
//!
//! 1. Mark the node stale.
//! 2. Walk its dependents breadth first, marking each fresh node stale.
//!    Nodes that were already stale are not walked again: their dependents
//!    were marked when they went stale and have not been re-resolved since.
//! 3. Return the newly stale nodes in topological order, so signal handlers
//!    see upstream nodes first.
//!
//! Nothing is recomputed here. Values are re-derived on the next read.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{NodeKey, StateNode};
use crate::component::ComponentIdx;

/// All nodes of the document and their recorded edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeKey, StateNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the node for `key`, creating an unresolved one if needed.
    pub fn ensure_node(&mut self, key: &NodeKey) -> &mut StateNode {
        self.nodes.entry(key.clone()).or_default()
    }

    pub fn get(&self, key: &NodeKey) -> Option<&StateNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &NodeKey) -> Option<&mut StateNode> {
        self.nodes.get_mut(key)
    }

    pub fn is_fresh(&self, key: &NodeKey) -> bool {
        self.nodes.get(key).is_some_and(StateNode::is_fresh)
    }

    /// Replace the edges of `dependent` with those read by its latest
    /// resolution.
    pub fn record_dependencies<I>(&mut self, dependent: &NodeKey, reads: I)
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let previous = self.ensure_node(dependent).take_dependencies();
        for dependency in &previous {
            if let Some(node) = self.nodes.get_mut(dependency) {
                node.remove_dependent(dependent);
            }
        }
        for dependency in reads {
            if &dependency == dependent {
                continue;
            }
            self.ensure_node(&dependency).add_dependent(dependent.clone());
            self.ensure_node(dependent).add_dependency(dependency);
        }
    }

    /// Mark `key` and everything downstream of it stale.
    ///
    /// Returns the newly stale nodes, dependencies before dependents.
    pub fn invalidate(&mut self, key: &NodeKey) -> Vec<NodeKey> {
        let mut stale = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(key.clone());

        while let Some(node_key) = queue.pop_front() {
            if !visited.insert(node_key.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&node_key) else {
                continue;
            };
            if !node.mark_stale() {
                continue;
            }
            tracing::trace!(node = %node_key, "marked stale");
            queue.extend(node.dependents().iter().cloned());
            stale.push(node_key);
        }

        self.topological_sort(stale)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    fn topological_sort(&self, nodes: Vec<NodeKey>) -> Vec<NodeKey> {
        let node_set: HashSet<&NodeKey> = nodes.iter().collect();
        let mut in_degree: HashMap<&NodeKey, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for key in &nodes {
            if let Some(node) = self.nodes.get(key) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(key, degree);
                if degree == 0 {
                    queue.push_back(key);
                }
            }
        }

        // Kahn's algorithm
        while let Some(key) = queue.pop_front() {
            result.push(key.clone());

            if let Some(node) = self.nodes.get(key) {
                for dependent in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        result
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, key: &NodeKey) {
        if let Some(node) = self.nodes.remove(key) {
            for dependency in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dependency) {
                    dep.remove_dependent(key);
                }
            }
            for dependent in node.dependents() {
                if let Some(dep) = self.nodes.get_mut(dependent) {
                    dep.remove_dependency(key);
                }
            }
        }
    }

    /// Remove every node of a component. Dependents in other components are
    /// marked stale first; the stale keys are returned.
    pub fn remove_component(&mut self, component: ComponentIdx) -> Vec<NodeKey> {
        let owned: Vec<NodeKey> = self
            .nodes
            .keys()
            .filter(|k| k.component == component)
            .cloned()
            .collect();

        let mut stale = Vec::new();
        for key in &owned {
            let dependents: Vec<NodeKey> = self
                .nodes
                .get(key)
                .map(|n| n.dependents().iter().cloned().collect())
                .unwrap_or_default();
            for dependent in dependents {
                if dependent.component != component {
                    stale.extend(self.invalidate(&dependent));
                }
            }
        }
        for key in &owned {
            self.remove_node(key);
        }
        stale.retain(|k| k.component != component);
        stale
    }

    /// Number of times the node's definition ran.
    pub fn evaluations(&self, key: &NodeKey) -> u64 {
        self.nodes.get(key).map_or(0, StateNode::evaluations)
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayKey;
    use crate::graph::node::Freshness;
    use crate::value::Value;

    fn key(c: u32, name: &str) -> NodeKey {
        NodeKey::variable(ComponentIdx(c), name)
    }

    fn fresh(graph: &mut DependencyGraph, k: &NodeKey) {
        graph.ensure_node(k).resolve(Value::Null, false, false);
    }

    #[test]
    fn record_replaces_previous_edges() {
        let mut graph = DependencyGraph::new();
        let a = key(0, "a");
        let b = key(0, "b");
        let derived = key(0, "derived");

        graph.record_dependencies(&derived, [a.clone()]);
        assert!(graph.get(&a).unwrap().dependents().contains(&derived));

        graph.record_dependencies(&derived, [b.clone()]);
        assert!(!graph.get(&a).unwrap().dependents().contains(&derived));
        assert!(graph.get(&b).unwrap().dependents().contains(&derived));
        assert_eq!(graph.get(&derived).unwrap().dependencies().len(), 1);
    }

    #[test]
    fn invalidate_propagates_in_topological_order() {
        let mut graph = DependencyGraph::new();

        // Create a chain: source -> derived1 -> derived2, plus source -> derived2
        let source = key(0, "source");
        let derived1 = key(0, "derived1");
        let derived2 = key(1, "derived2");
        for k in [&source, &derived1, &derived2] {
            fresh(&mut graph, k);
        }
        graph.record_dependencies(&derived1, [source.clone()]);
        graph.record_dependencies(&derived2, [source.clone(), derived1.clone()]);

        let stale = graph.invalidate(&source);
        assert_eq!(stale.len(), 3);
        let pos = |k: &NodeKey| stale.iter().position(|s| s == k);
        assert!(pos(&source) < pos(&derived1));
        assert!(pos(&derived1) < pos(&derived2));
        assert_eq!(graph.get(&derived2).unwrap().freshness(), Freshness::Stale);
    }

    #[test]
    fn already_stale_nodes_are_not_walked_again() {
        let mut graph = DependencyGraph::new();
        let a = key(0, "a");
        let b = key(0, "b");
        fresh(&mut graph, &a);
        fresh(&mut graph, &b);
        graph.record_dependencies(&b, [a.clone()]);

        assert_eq!(graph.invalidate(&a).len(), 2);
        assert!(graph.invalidate(&a).is_empty());
    }

    #[test]
    fn sibling_entries_stay_fresh() {
        let mut graph = DependencyGraph::new();
        let c = ComponentIdx(2);
        let src0 = key(0, "x1");
        let src1 = key(1, "x1");
        let e0 = NodeKey::entry(c, "points", ArrayKey::new(&[0, 0]));
        let e1 = NodeKey::entry(c, "points", ArrayKey::new(&[1, 0]));
        for k in [&src0, &src1, &e0, &e1] {
            fresh(&mut graph, k);
        }
        graph.record_dependencies(&e0, [src0.clone()]);
        graph.record_dependencies(&e1, [src1]);

        graph.invalidate(&src0);
        assert!(!graph.is_fresh(&e0));
        assert!(graph.is_fresh(&e1));
    }

    #[test]
    fn removing_component_invalidates_outside_dependents() {
        let mut graph = DependencyGraph::new();
        let owned = key(5, "value");
        let outside = key(1, "sum");
        fresh(&mut graph, &owned);
        fresh(&mut graph, &outside);
        graph.record_dependencies(&outside, [owned.clone()]);

        let stale = graph.remove_component(ComponentIdx(5));
        assert_eq!(stale, vec![outside.clone()]);
        assert!(graph.get(&owned).is_none());
        assert!(graph.get(&outside).unwrap().dependencies().is_empty());
        assert_eq!(graph.node_count(), 1);
    }
}
