//! Transitive reduction and closure.
//!
//! Both return a new graph over detached copies of the members, so neither
//! input relations nor the caller's nodes are touched.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, EdgeRef};
use tracing::{info, instrument};

use crate::error::Result;
use crate::graph::Graph;
use crate::graph::project::Projection;
use crate::node::{Attributes, Node, Reference};

impl<T: Reference> Graph<T> {
    /// The minimal graph with the same in-graph reachability.
    ///
    /// An edge `u → v` is dropped when `v` is also reachable from another
    /// direct dependent of `u`. Kept edges retain their attributes.
    ///
    /// # Errors
    ///
    /// [`crate::GraphError::Cycle`] if the members contain a cycle.
    #[instrument(skip_all, fields(members = self.len()))]
    pub fn transitive_reduction(&self) -> Result<Self> {
        let order = self.topological_order()?;
        let projection = Projection::of(self);
        let graph = &projection.graph;

        // Everything reachable from u in one or more steps, built sinks first.
        let mut reachable: HashMap<NodeIndex, HashSet<NodeIndex>> =
            HashMap::with_capacity(order.len());
        for node in order.iter().rev() {
            let Some(u) = projection.index_of(node) else {
                continue;
            };
            let mut reach_u: HashSet<NodeIndex> = HashSet::new();
            for v in graph.neighbors_directed(u, Direction::Outgoing) {
                reach_u.insert(v);
                if let Some(reach_v) = reachable.get(&v) {
                    reach_u.extend(reach_v.iter().copied());
                }
            }
            reachable.insert(u, reach_u);
        }

        let kept: Vec<(NodeIndex, NodeIndex, Attributes)> = graph
            .edge_references()
            .filter(|edge| {
                let (u, v) = (edge.source(), edge.target());
                !graph
                    .neighbors_directed(u, Direction::Outgoing)
                    .filter(|&w| w != v)
                    .any(|w| reachable.get(&w).is_some_and(|reach_w| reach_w.contains(&v)))
            })
            .map(|edge| (edge.source(), edge.target(), edge.weight().clone()))
            .collect();

        info!(
            edges = graph.edge_count(),
            kept = kept.len(),
            "computed transitive reduction"
        );
        Ok(self.rebuild(&projection, kept))
    }

    /// A graph with a direct edge `u → v` for every pair where `v` is
    /// reachable from `u` through in-graph edges. Existing edges keep their
    /// attributes; derived edges have none. Cycles are accepted; a node is
    /// never linked to itself.
    #[must_use]
    #[instrument(skip_all, fields(members = self.len()))]
    pub fn transitive_closure(&self) -> Self {
        let projection = Projection::of(self);
        let graph = &projection.graph;

        let mut edges: Vec<(NodeIndex, NodeIndex, Attributes)> = Vec::new();
        for u in graph.node_indices() {
            let mut reached: Vec<NodeIndex> = Vec::new();
            let mut dfs = Dfs::new(graph, u);
            while let Some(v) = dfs.next(graph) {
                if v != u {
                    reached.push(v);
                }
            }
            reached.sort_unstable();
            for v in reached {
                let attrs = graph
                    .find_edge(u, v)
                    .map(|edge| graph[edge].clone())
                    .unwrap_or_default();
                edges.push((u, v, attrs));
            }
        }

        info!(
            edges = graph.edge_count(),
            closed = edges.len(),
            "computed transitive closure"
        );
        self.rebuild(&projection, edges)
    }

    /// Copy the projected members and wire `edges` between the copies.
    fn rebuild(
        &self,
        projection: &Projection<T>,
        edges: Vec<(NodeIndex, NodeIndex, Attributes)>,
    ) -> Self {
        let copies: Vec<Node<T>> = projection
            .graph
            .node_weights()
            .map(Node::detached_copy)
            .collect();
        let mut result = Self::with_config(self.config().clone());
        for copy in &copies {
            result.add_node(copy);
        }
        for (u, v, attrs) in edges {
            result.wire_unchecked(&copies[u.index()], &copies[v.index()], attrs);
        }
        result
    }
}
