//! Integrity checks and cycle diagnostics.
//!
//! `Graph::add_edge` never lets a cycle into a graph, but relations wired at
//! node level with cycle checking off can still form loops between members.
//! These helpers find them and suggest which edges to remove.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::graph::order::{layers, residual_error};
use crate::graph::project::Projection;
use crate::node::{Node, Reference};

/// A strongly connected set of members with edges suggested for removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport<T> {
    /// Members of the cycle, in member insertion order.
    pub members: Vec<Node<T>>,
    /// `(dependency, dependent)` back edges whose removal makes the
    /// component acyclic.
    pub suggested_breaks: Vec<(Node<T>, Node<T>)>,
}

impl<T: Reference> Graph<T> {
    /// Fail if the in-graph edges contain a cycle.
    ///
    /// # Errors
    ///
    /// [`GraphError::Cycle`] carrying the members Kahn's algorithm could not
    /// place.
    pub fn check_cycles(&self) -> Result<()> {
        let projection = Projection::of(self);
        layers(&projection)
            .map(|_| ())
            .map_err(|residual| residual_error(&projection, &residual))
    }

    /// Verify that every relation of every member is mirrored on the other
    /// endpoint.
    ///
    /// # Errors
    ///
    /// [`GraphError::Inconsistent`] naming the first unmirrored relation.
    pub fn check_consistency(&self) -> Result<()> {
        for node in self {
            for dependency in node.dependencies() {
                if !dependency.is_required_by(node) {
                    return Err(GraphError::Inconsistent {
                        detail: format!(
                            "'{node}' depends on '{dependency}' but '{dependency}' does not list it as a dependent"
                        ),
                    });
                }
            }
            for dependent in node.dependents() {
                if !dependent.depends_on(node) {
                    return Err(GraphError::Inconsistent {
                        detail: format!(
                            "'{dependent}' is listed as a dependent of '{node}' but does not depend on it"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every in-graph cycle as the members of one strongly connected
    /// component, each in member order, ordered by first member.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<Node<T>>> {
        let projection = Projection::of(self);
        cyclic_components(&projection)
            .iter()
            .map(|component| projection.nodes_at(component))
            .collect()
    }

    /// Every in-graph cycle with back edges that would break it.
    #[must_use]
    pub fn suggest_cycle_breaks(&self) -> Vec<CycleReport<T>> {
        let projection = Projection::of(self);
        cyclic_components(&projection)
            .into_iter()
            .map(|component| {
                let suggested_breaks = back_edges(&projection, &component)
                    .into_iter()
                    .map(|(u, v)| (projection.node(u).clone(), projection.node(v).clone()))
                    .collect();
                CycleReport {
                    members: projection.nodes_at(&component),
                    suggested_breaks,
                }
            })
            .collect()
    }
}

/// Strongly connected components with more than one member, each sorted.
/// Self loops cannot exist between members.
fn cyclic_components<T: Reference>(projection: &Projection<T>) -> Vec<Vec<NodeIndex>> {
    let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&projection.graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .collect();
    components.sort_unstable_by_key(|component| component.first().copied());
    components
}

/// Iterative DFS inside one component, starting from its first member,
/// collecting edges to nodes on the current DFS path.
fn back_edges<T: Reference>(
    projection: &Projection<T>,
    component: &[NodeIndex],
) -> Vec<(NodeIndex, NodeIndex)> {
    let in_component: HashSet<NodeIndex> = component.iter().copied().collect();
    let successors = |idx: NodeIndex| -> Vec<NodeIndex> {
        projection
            .sorted_neighbors(idx, Direction::Outgoing)
            .into_iter()
            .filter(|n| in_component.contains(n))
            .collect()
    };

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut on_path: HashSet<NodeIndex> = HashSet::new();
    let mut breaks: Vec<(NodeIndex, NodeIndex)> = Vec::new();
    // Each frame: (node, successors, next successor to visit).
    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();

    for &start in component {
        if !visited.insert(start) {
            continue;
        }
        on_path.insert(start);
        stack.push((start, successors(start), 0));

        while let Some(frame) = stack.last_mut() {
            let current = frame.0;
            let next = frame.1.get(frame.2).copied();
            frame.2 += 1;

            match next {
                Some(next) if on_path.contains(&next) => breaks.push((current, next)),
                Some(next) => {
                    if visited.insert(next) {
                        on_path.insert(next);
                        stack.push((next, successors(next), 0));
                    }
                }
                None => {
                    on_path.remove(&current);
                    stack.pop();
                }
            }
        }
    }

    breaks.sort_unstable();
    breaks
}
