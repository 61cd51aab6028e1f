//! Reachability slices and simple path enumeration.
//!
//! Slices are new graphs over the *same* nodes (not copies): they share
//! relations and observe mutations like any other graph. A node that is not
//! a member of the source graph yields an empty slice.

use std::collections::HashSet;

use petgraph::Outgoing;
use petgraph::graph::NodeIndex;
use tracing::instrument;

use crate::graph::Graph;
use crate::graph::project::Projection;
use crate::node::{Direction, Node, NodeId, Reference};

impl<T: Reference> Graph<T> {
    /// `node` and every member it transitively depends on.
    #[must_use]
    pub fn upstream_of(&self, node: &Node<T>) -> Self {
        self.slice(node, Direction::Upstream)
    }

    /// `node` and every member that transitively depends on it.
    #[must_use]
    pub fn downstream_of(&self, node: &Node<T>) -> Self {
        self.slice(node, Direction::Downstream)
    }

    fn slice(&self, node: &Node<T>, direction: Direction) -> Self {
        if !self.contains(node) {
            return Self::with_config(self.config().clone());
        }
        let mut selected: HashSet<NodeId> = self
            .reachable(node, direction)
            .iter()
            .map(Node::id)
            .collect();
        selected.insert(node.id());
        self.sharing(self.iter().filter(|member| selected.contains(&member.id())))
    }

    /// Every member lying on some path from `a` to `b`, including both ends.
    /// Empty when `b` is not reachable from `a`.
    #[must_use]
    #[instrument(skip_all, fields(members = self.len()))]
    pub fn subgraph_between(&self, a: &Node<T>, b: &Node<T>) -> Self {
        let downstream: HashSet<NodeId> = self.downstream_of(a).iter().map(Node::id).collect();
        let upstream: HashSet<NodeId> = self.upstream_of(b).iter().map(Node::id).collect();
        if !downstream.contains(&b.id()) {
            return Self::with_config(self.config().clone());
        }
        self.sharing(self.iter().filter(|member| {
            downstream.contains(&member.id()) && upstream.contains(&member.id())
        }))
    }

    /// Lazily enumerate every simple path from `a` to `b` through in-graph
    /// edges, bounded by [`crate::GraphConfig::max_paths`] when set.
    ///
    /// The set of edges is captured when this is called; later mutations do
    /// not affect an iterator already handed out.
    #[must_use]
    pub fn all_paths(&self, a: &Node<T>, b: &Node<T>) -> AllPaths<T> {
        AllPaths::new(Projection::of(self), a, b, self.config().max_paths)
    }
}

/// Iterator over simple paths, produced by [`Graph::all_paths`].
///
/// Depth-first with successors in member order, so paths come out in a
/// deterministic order. Each path is `a, ..., b`; when `a == b` the single
/// path `[a]` is produced.
pub struct AllPaths<T> {
    projection: Projection<T>,
    target: Option<NodeIndex>,
    // Current DFS path: (node, successors, next successor to visit).
    stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)>,
    on_path: HashSet<NodeIndex>,
    remaining: Option<usize>,
    trivial: Option<NodeIndex>,
}

impl<T: Reference> AllPaths<T> {
    fn new(projection: Projection<T>, a: &Node<T>, b: &Node<T>, limit: Option<usize>) -> Self {
        let mut paths = Self {
            target: None,
            stack: Vec::new(),
            on_path: HashSet::new(),
            remaining: limit,
            trivial: None,
            projection,
        };
        let (Some(start), Some(target)) = (paths.projection.index_of(a), paths.projection.index_of(b))
        else {
            return paths;
        };

        if start == target {
            paths.trivial = Some(start);
        } else {
            paths.target = Some(target);
            let successors = paths.projection.sorted_neighbors(start, Outgoing);
            paths.stack.push((start, successors, 0));
            paths.on_path.insert(start);
        }
        paths
    }

    fn emit(&mut self, indices: &[NodeIndex]) -> Vec<Node<T>> {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.projection.nodes_at(indices)
    }
}

impl<T: Reference> Iterator for AllPaths<T> {
    type Item = Vec<Node<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        if let Some(only) = self.trivial.take() {
            return Some(self.emit(&[only]));
        }
        let target = self.target?;

        while let Some(frame) = self.stack.last_mut() {
            let next = frame.1.get(frame.2).copied();
            frame.2 += 1;

            match next {
                Some(next) if next == target => {
                    let mut path: Vec<NodeIndex> = self.stack.iter().map(|(idx, _, _)| *idx).collect();
                    path.push(target);
                    return Some(self.emit(&path));
                }
                Some(next) => {
                    if self.on_path.insert(next) {
                        let successors = self.projection.sorted_neighbors(next, Outgoing);
                        self.stack.push((next, successors, 0));
                    }
                }
                None => {
                    if let Some((done, _, _)) = self.stack.pop() {
                        self.on_path.remove(&done);
                    }
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::node::Attributes;

    fn refs(nodes: &[Node<&'static str>]) -> Vec<&'static str> {
        nodes.iter().map(|n| *n.reference()).collect()
    }

    /// a → b → d, a → c → d, d → e, plus an unrelated member z.
    fn sample(config: GraphConfig) -> (Graph<&'static str>, Vec<Node<&'static str>>) {
        let nodes: Vec<Node<&'static str>> =
            ["a", "b", "c", "d", "e", "z"].into_iter().map(Node::new).collect();
        let mut graph = Graph::from_nodes_with_config(&nodes, config);
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)] {
            graph
                .add_edge(&nodes[from], &nodes[to], Attributes::new())
                .expect("edge");
        }
        (graph, nodes)
    }

    #[test]
    fn upstream_and_downstream_include_start() {
        let (graph, nodes) = sample(GraphConfig::default());
        assert_eq!(refs(&graph.upstream_of(&nodes[3]).nodes()), vec!["a", "b", "c", "d"]);
        assert_eq!(refs(&graph.downstream_of(&nodes[2]).nodes()), vec!["c", "d", "e"]);
        assert_eq!(refs(&graph.downstream_of(&nodes[5]).nodes()), vec!["z"]);
    }

    #[test]
    fn slices_share_nodes() {
        let (graph, nodes) = sample(GraphConfig::default());
        let slice = graph.downstream_of(&nodes[3]);
        assert!(slice.contains(&nodes[3]));
        assert_eq!(slice.edge_count(), 1);
    }

    #[test]
    fn non_member_yields_empty_results() {
        let (graph, nodes) = sample(GraphConfig::default());
        let stranger = Node::new("stranger");
        assert!(graph.upstream_of(&stranger).is_empty());
        assert!(graph.subgraph_between(&stranger, &nodes[4]).is_empty());
        assert_eq!(graph.all_paths(&nodes[0], &stranger).count(), 0);
    }

    #[test]
    fn between_is_intersection() {
        let (graph, nodes) = sample(GraphConfig::default());
        let between = graph.subgraph_between(&nodes[1], &nodes[4]);
        assert_eq!(refs(&between.nodes()), vec!["b", "d", "e"]);

        let unrelated = graph.subgraph_between(&nodes[4], &nodes[0]);
        assert!(unrelated.is_empty());
    }

    #[test]
    fn all_paths_enumerates_simple_paths_in_order() {
        let (graph, nodes) = sample(GraphConfig::default());
        let paths: Vec<Vec<&str>> = graph
            .all_paths(&nodes[0], &nodes[4])
            .map(|path| refs(&path))
            .collect();
        assert_eq!(paths, vec![vec!["a", "b", "d", "e"], vec!["a", "c", "d", "e"]]);
    }

    #[test]
    fn all_paths_to_self_is_single_node() {
        let (graph, nodes) = sample(GraphConfig::default());
        let paths: Vec<Vec<&str>> = graph
            .all_paths(&nodes[2], &nodes[2])
            .map(|path| refs(&path))
            .collect();
        assert_eq!(paths, vec![vec!["c"]]);
    }

    #[test]
    fn all_paths_respects_limit() {
        let config = GraphConfig {
            max_paths: Some(1),
            ..GraphConfig::default()
        };
        let (graph, nodes) = sample(config);
        assert_eq!(graph.all_paths(&nodes[0], &nodes[3]).count(), 1);
    }

    #[test]
    fn all_paths_is_lazy_over_dense_graph() {
        // Complete DAG on 12 nodes: 2^10 simple paths from first to last.
        let nodes: Vec<Node<u32>> = (0..12).map(Node::new).collect();
        let mut graph = Graph::from_nodes(&nodes);
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                graph
                    .add_edge(&nodes[i], &nodes[j], Attributes::new())
                    .expect("edge");
            }
        }
        let mut paths = graph.all_paths(&nodes[0], &nodes[11]);
        let first = paths.next().expect("first path");
        assert_eq!(first.len(), 12, "depth first follows the longest branch first");
        assert_eq!(paths.take(9).count(), 9);
        assert_eq!(graph.all_paths(&nodes[0], &nodes[11]).count(), 1024);
    }
}
