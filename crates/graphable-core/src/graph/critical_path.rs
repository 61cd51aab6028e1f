//! Critical path method.
//!
//! # Definitions
//!
//! Durations come from [`Node::duration`]; an unset duration counts as 0.
//!
//! | Term              | Definition |
//! |-------------------|------------|
//! | `earliest_start`  | Latest `earliest_finish` among in-graph dependencies (0 for sources). |
//! | `earliest_finish` | `earliest_start + duration`. |
//! | `latest_finish`   | Smallest `latest_start` among in-graph dependents (project duration for sinks). |
//! | `latest_start`    | `latest_finish - duration`. |
//! | `slack`           | `latest_start - earliest_start`; zero on the critical path. |
//!
//! Times are `f64`, so "zero" means within [`GraphConfig::slack_tolerance`].
//!
//! [`GraphConfig::slack_tolerance`]: crate::config::GraphConfig::slack_tolerance

use indexmap::IndexMap;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::graph::Graph;
use crate::graph::project::Projection;
use crate::node::{Node, NodeId, Reference};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Per-node schedule computed by [`Graph::cpm_analysis`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTiming {
    /// Earliest time the node can start.
    pub earliest_start: f64,
    /// `earliest_start + duration`.
    pub earliest_finish: f64,
    /// Latest start that does not delay the project.
    pub latest_start: f64,
    /// `latest_start + duration`.
    pub latest_finish: f64,
    /// `latest_start - earliest_start`.
    pub slack: f64,
}

impl NodeTiming {
    /// Whether the slack is zero within `tolerance`.
    #[must_use]
    pub fn is_critical(&self, tolerance: f64) -> bool {
        self.slack.abs() <= tolerance
    }
}

/// Result of a CPM pass over a graph's members.
#[derive(Debug, Clone)]
pub struct CpmReport<T> {
    timings: IndexMap<NodeId, (Node<T>, NodeTiming)>,
    project_duration: f64,
    tolerance: f64,
}

impl<T: Reference> CpmReport<T> {
    /// Timing of `node`, if it was a member.
    #[must_use]
    pub fn timing(&self, node: &Node<T>) -> Option<&NodeTiming> {
        self.timings.get(&node.id()).map(|(_, timing)| timing)
    }

    /// The largest earliest finish; 0 for an empty graph.
    #[must_use]
    pub const fn project_duration(&self) -> f64 {
        self.project_duration
    }

    /// Nodes and timings in topological order.
    pub fn iter(&self) -> impl Iterator<Item = (&Node<T>, &NodeTiming)> {
        self.timings.values().map(|(node, timing)| (node, timing))
    }

    /// Number of nodes analysed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timings.len()
    }

    /// Whether no nodes were analysed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Every zero-slack node, in topological order.
    #[must_use]
    pub fn critical_nodes(&self) -> Vec<Node<T>> {
        self.timings
            .values()
            .filter(|(_, timing)| timing.is_critical(self.tolerance))
            .map(|(node, _)| node.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

impl<T: Reference> Graph<T> {
    /// Forward and backward CPM passes over the members.
    ///
    /// # Errors
    ///
    /// [`crate::GraphError::Cycle`] if the members contain a cycle.
    #[instrument(skip_all, fields(members = self.len()))]
    pub fn cpm_analysis(&self) -> Result<CpmReport<T>> {
        let order = self.topological_order()?;
        let projection = Projection::of(self);
        let (topo, timings, project_duration) = schedule(&projection, &order);

        let timings = topo
            .iter()
            .map(|&idx| {
                let node = projection.node(idx).clone();
                (node.id(), (node, timings[idx.index()]))
            })
            .collect();

        debug!(project_duration, "completed CPM analysis");
        Ok(CpmReport {
            timings,
            project_duration,
            tolerance: self.config().slack_tolerance,
        })
    }

    /// One chain of zero-slack nodes from a source to a sink whose finish is
    /// the project duration, in dependency order. Empty for an empty graph.
    ///
    /// When several chains qualify, the sink latest in topological order is
    /// chosen and each step back takes the earliest qualifying dependency.
    ///
    /// # Errors
    ///
    /// [`crate::GraphError::Cycle`] if the members contain a cycle.
    pub fn critical_path(&self) -> Result<Vec<Node<T>>> {
        let order = self.topological_order()?;
        let projection = Projection::of(self);
        let (topo, timings, project_duration) = schedule(&projection, &order);
        let tolerance = self.config().slack_tolerance;

        let mut position = vec![0usize; projection.len()];
        for (pos, idx) in topo.iter().enumerate() {
            position[idx.index()] = pos;
        }
        let critical = |idx: NodeIndex| timings[idx.index()].is_critical(tolerance);

        let Some(&sink) = topo.iter().rev().find(|&&idx| {
            critical(idx)
                && (timings[idx.index()].earliest_finish - project_duration).abs() <= tolerance
        }) else {
            return Ok(Vec::new());
        };

        let mut path = vec![sink];
        let mut current = sink;
        while let Some(previous) = projection
            .graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|&p| {
                critical(p)
                    && (timings[p.index()].earliest_finish - timings[current.index()].earliest_start)
                        .abs()
                        <= tolerance
            })
            .min_by_key(|p| position[p.index()])
        {
            path.push(previous);
            current = previous;
        }

        path.reverse();
        Ok(projection.nodes_at(&path))
    }

    /// Every zero-slack member, in topological order.
    ///
    /// # Errors
    ///
    /// [`crate::GraphError::Cycle`] if the members contain a cycle.
    pub fn critical_nodes(&self) -> Result<Vec<Node<T>>> {
        Ok(self.cpm_analysis()?.critical_nodes())
    }
}

/// Run both passes. Returns the topological order as projection indices,
/// timings indexed by projection index, and the project duration.
fn schedule<T: Reference>(
    projection: &Projection<T>,
    order: &[Node<T>],
) -> (Vec<NodeIndex>, Vec<NodeTiming>, f64) {
    let graph = &projection.graph;
    let topo: Vec<NodeIndex> = order
        .iter()
        .filter_map(|node| projection.index_of(node))
        .collect();
    let duration: Vec<f64> = graph
        .node_weights()
        .map(|node| node.duration().unwrap_or(0.0))
        .collect();

    // Forward pass.
    let mut earliest_finish = vec![0.0_f64; projection.len()];
    let mut earliest_start = vec![0.0_f64; projection.len()];
    for &v in &topo {
        let start = graph
            .neighbors_directed(v, Direction::Incoming)
            .map(|p| earliest_finish[p.index()])
            .fold(0.0_f64, f64::max);
        earliest_start[v.index()] = start;
        earliest_finish[v.index()] = start + duration[v.index()];
    }

    let project_duration = earliest_finish.iter().copied().fold(0.0_f64, f64::max);

    // Backward pass.
    let mut latest_start = vec![0.0_f64; projection.len()];
    let mut latest_finish = vec![0.0_f64; projection.len()];
    for &v in topo.iter().rev() {
        let finish = graph
            .neighbors_directed(v, Direction::Outgoing)
            .map(|s| latest_start[s.index()])
            .fold(project_duration, f64::min);
        latest_finish[v.index()] = finish;
        latest_start[v.index()] = finish - duration[v.index()];
    }

    let timings = (0..projection.len())
        .map(|i| NodeTiming {
            earliest_start: earliest_start[i],
            earliest_finish: earliest_finish[i],
            latest_start: latest_start[i],
            latest_finish: latest_finish[i],
            slack: latest_start[i] - earliest_start[i],
        })
        .collect();

    (topo, timings, project_duration)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
