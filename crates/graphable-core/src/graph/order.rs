//! Topological and layered order.
//!
//! Both orders come from one level-by-level pass of Kahn's algorithm over the
//! in-graph edges. Layer 0 holds the members with no in-graph dependencies;
//! layer `k` holds the members whose dependencies all sit in earlier layers.
//! Each layer is sorted by member insertion order, and the topological order
//! is the concatenation of the layers, so the two always agree.

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use tracing::{instrument, warn};

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::graph::project::Projection;
use crate::node::{Node, Reference};

/// Layer the projection. On a cycle, returns the unplaced nodes in member
/// order as the error.
pub(crate) fn layers<T: Reference>(
    projection: &Projection<T>,
) -> std::result::Result<Vec<Vec<NodeIndex>>, Vec<NodeIndex>> {
    let graph = &projection.graph;
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut layers: Vec<Vec<NodeIndex>> = Vec::new();
    let mut current: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();
    let mut placed = 0;

    while !current.is_empty() {
        let mut next: Vec<NodeIndex> = Vec::new();
        for &idx in &current {
            for succ in graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[succ.index()];
                *degree -= 1;
                if *degree == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        placed += current.len();
        layers.push(std::mem::replace(&mut current, next));
    }

    if placed < projection.len() {
        let residual = graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] > 0)
            .collect();
        return Err(residual);
    }

    Ok(layers)
}

pub(crate) fn residual_error<T: Reference>(
    projection: &Projection<T>,
    residual: &[NodeIndex],
) -> GraphError {
    let cycle: Vec<String> = residual
        .iter()
        .map(|&idx| projection.node(idx).label())
        .collect();
    warn!(unplaced = cycle.len(), "graph contains a cycle");
    GraphError::Cycle { cycle }
}

impl<T: Reference> Graph<T> {
    /// Members in an order where every in-graph dependency precedes its
    /// dependents. Ties follow member insertion order. Cached until a
    /// structural change.
    ///
    /// # Errors
    ///
    /// [`GraphError::Cycle`] carrying the members that could not be ordered.
    pub fn topological_order(&self) -> Result<Vec<Node<T>>> {
        if let Some(order) = self.cache.topological.borrow().as_ref() {
            return Ok(order.clone());
        }
        let order: Vec<Node<T>> = self.layered_order()?.into_iter().flatten().collect();
        *self.cache.topological.borrow_mut() = Some(order.clone());
        Ok(order)
    }

    /// Members grouped into layers of mutually independent nodes. Cached
    /// until a structural change.
    ///
    /// # Errors
    ///
    /// [`GraphError::Cycle`] carrying the members that could not be placed.
    #[instrument(skip_all, fields(members = self.len()))]
    pub fn layered_order(&self) -> Result<Vec<Vec<Node<T>>>> {
        if let Some(layers) = self.cache.layers.borrow().as_ref() {
            return Ok(layers.clone());
        }
        let projection = Projection::of(self);
        let layered: Vec<Vec<Node<T>>> = layers(&projection)
            .map_err(|residual| residual_error(&projection, &residual))?
            .iter()
            .map(|layer| projection.nodes_at(layer))
            .collect();
        *self.cache.layers.borrow_mut() = Some(layered.clone());
        Ok(layered)
    }

    /// Topological order restricted to members passing `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::topological_order`].
    pub fn topological_order_filtered<F>(&self, predicate: F) -> Result<Vec<Node<T>>>
    where
        F: Fn(&Node<T>) -> bool,
    {
        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|node| predicate(node))
            .collect())
    }

    /// Topological order restricted to members carrying `tag`.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::topological_order`].
    pub fn topological_order_tagged(&self, tag: &str) -> Result<Vec<Node<T>>> {
        self.topological_order_filtered(|node| node.has_tag(tag))
    }

    /// Layered order restricted to members passing `predicate`; layers left
    /// empty by the filter are dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::layered_order`].
    pub fn layered_order_filtered<F>(&self, predicate: F) -> Result<Vec<Vec<Node<T>>>>
    where
        F: Fn(&Node<T>) -> bool,
    {
        Ok(self
            .layered_order()?
            .into_iter()
            .map(|layer| layer.into_iter().filter(|node| predicate(node)).collect::<Vec<_>>())
            .filter(|layer| !layer.is_empty())
            .collect())
    }

    /// Layered order restricted to members carrying `tag`.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::layered_order`].
    pub fn layered_order_tagged(&self, tag: &str) -> Result<Vec<Vec<Node<T>>>> {
        self.layered_order_filtered(|node| node.has_tag(tag))
    }
}
