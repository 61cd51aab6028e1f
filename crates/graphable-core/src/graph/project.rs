//! Membership-scoped petgraph projection.
//!
//! The algorithms run on a [`DiGraph`] built from the current membership:
//! node `i` is the `i`-th member in insertion order, and an edge `u → v`
//! exists for every relation whose two endpoints are members. Relations that
//! leave the membership are dropped here, which is what makes every analysis
//! respect the subgraph view.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::Graph;
use crate::node::{Attributes, Node, NodeId, Reference};

/// A snapshot of a graph's membership and in-graph edges.
pub(crate) struct Projection<T> {
    pub(crate) graph: DiGraph<Node<T>, Attributes>,
    pub(crate) index: HashMap<NodeId, NodeIndex>,
}

impl<T: Reference> Projection<T> {
    pub(crate) fn of(source: &Graph<T>) -> Self {
        let mut graph = DiGraph::with_capacity(source.len(), 0);
        let mut index = HashMap::with_capacity(source.len());

        for node in source {
            let idx = graph.add_node(node.clone());
            index.insert(node.id(), idx);
        }

        for node in source {
            let from = index[&node.id()];
            for (dependent, attrs) in node.dependents_with_attributes() {
                if let Some(&to) = index.get(&dependent.id()) {
                    graph.add_edge(from, to, attrs);
                }
            }
        }

        Self { graph, index }
    }

    pub(crate) fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &Node<T> {
        &self.graph[idx]
    }

    pub(crate) fn index_of(&self, node: &Node<T>) -> Option<NodeIndex> {
        self.index.get(&node.id()).copied()
    }

    /// Neighbours of `idx` in `direction`, ordered by member position.
    pub(crate) fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    pub(crate) fn nodes_at(&self, indices: &[NodeIndex]) -> Vec<Node<T>> {
        indices.iter().map(|&idx| self.node(idx).clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_edges_leaving_the_membership() {
        let a = Node::new("a");
        let b = Node::new("b");
        let outside = Node::new("x");
        let mut graph = Graph::new();
        graph.add_edge(&a, &b, Attributes::new()).expect("a→b");
        outside
            .add_dependency(&b, Attributes::new(), false)
            .expect("b→x");

        let projection = Projection::of(&graph);
        assert_eq!(projection.len(), 2);
        assert_eq!(projection.graph.edge_count(), 1);
        assert_eq!(projection.index_of(&a), Some(NodeIndex::new(0)));
        assert!(projection.index_of(&outside).is_none());
    }

    #[test]
    fn neighbors_follow_insertion_order() {
        let hub = Node::new("hub");
        let late = Node::new("late");
        let early = Node::new("early");
        let mut graph = Graph::from_nodes([&hub, &early, &late]);
        graph.add_edge(&hub, &late, Attributes::new()).expect("edge");
        graph.add_edge(&hub, &early, Attributes::new()).expect("edge");

        let projection = Projection::of(&graph);
        let hub_idx = projection.index_of(&hub).expect("member");
        let out = projection.sorted_neighbors(hub_idx, Direction::Outgoing);
        let names: Vec<&str> = out.iter().map(|&i| *projection.node(i).reference()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }
}
