//! Lazy breadth-first and depth-first walks.
//!
//! Walks follow node-level relations in their insertion order. With
//! `limit_to_graph` they only step onto members, and a start node that is not
//! a member yields nothing.

use std::collections::{HashSet, VecDeque};

use crate::graph::Graph;
use crate::node::{Direction, Node, NodeId, Reference};

impl<T: Reference> Graph<T> {
    /// Breadth-first walk from `start` in `direction`, `start` first.
    #[must_use]
    pub fn bfs(&self, start: &Node<T>, direction: Direction, limit_to_graph: bool) -> Traversal<'_, T> {
        Traversal::new(self, start, direction, limit_to_graph, Strategy::BreadthFirst)
    }

    /// Depth-first preorder walk from `start` in `direction`, `start` first.
    #[must_use]
    pub fn dfs(&self, start: &Node<T>, direction: Direction, limit_to_graph: bool) -> Traversal<'_, T> {
        Traversal::new(self, start, direction, limit_to_graph, Strategy::DepthFirst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    BreadthFirst,
    DepthFirst,
}

/// Iterator produced by [`Graph::bfs`] and [`Graph::dfs`]. Each node is
/// yielded once.
pub struct Traversal<'g, T: Reference> {
    graph: &'g Graph<T>,
    direction: Direction,
    limit_to_graph: bool,
    strategy: Strategy,
    start: Option<Node<T>>,
    visited: HashSet<NodeId>,
    queue: VecDeque<Node<T>>,
    // (node, its neighbours, next neighbour to look at)
    stack: Vec<(Node<T>, Vec<Node<T>>, usize)>,
}

impl<'g, T: Reference> Traversal<'g, T> {
    fn new(
        graph: &'g Graph<T>,
        start: &Node<T>,
        direction: Direction,
        limit_to_graph: bool,
        strategy: Strategy,
    ) -> Self {
        let mut traversal = Self {
            graph,
            direction,
            limit_to_graph,
            strategy,
            start: None,
            visited: HashSet::new(),
            queue: VecDeque::new(),
            stack: Vec::new(),
        };
        if traversal.allows(start) {
            traversal.start = Some(start.clone());
        }
        traversal
    }

    fn allows(&self, node: &Node<T>) -> bool {
        !self.limit_to_graph || self.graph.contains(node)
    }

    fn next_breadth_first(&mut self) -> Option<Node<T>> {
        let current = self.queue.pop_front()?;
        for next in current.neighbors(self.direction) {
            if self.allows(&next) && self.visited.insert(next.id()) {
                self.queue.push_back(next);
            }
        }
        Some(current)
    }

    fn next_depth_first(&mut self) -> Option<Node<T>> {
        while let Some(frame) = self.stack.last_mut() {
            let next = frame.1.get(frame.2).cloned();
            frame.2 += 1;

            match next {
                Some(next) => {
                    if self.allows(&next) && self.visited.insert(next.id()) {
                        let neighbors = next.neighbors(self.direction);
                        self.stack.push((next.clone(), neighbors, 0));
                        return Some(next);
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
        None
    }
}

impl<T: Reference> Iterator for Traversal<'_, T> {
    type Item = Node<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(start) = self.start.take() {
            self.visited.insert(start.id());
            match self.strategy {
                Strategy::BreadthFirst => self.queue.push_back(start),
                Strategy::DepthFirst => {
                    let neighbors = start.neighbors(self.direction);
                    self.stack.push((start.clone(), neighbors, 0));
                    return Some(start);
                }
            }
        }
        match self.strategy {
            Strategy::BreadthFirst => self.next_breadth_first(),
            Strategy::DepthFirst => self.next_depth_first(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Attributes;

    fn refs(nodes: impl Iterator<Item = Node<&'static str>>) -> Vec<&'static str> {
        nodes.map(|n| *n.reference()).collect()
    }

    /// `a → b, a → c, b → d, c → d` plus `b → x` where `x` is not a member.
    fn diamond() -> (Graph<&'static str>, Vec<Node<&'static str>>) {
        let nodes: Vec<Node<&'static str>> = ["a", "b", "c", "d", "x"].into_iter().map(Node::new).collect();
        let mut graph = Graph::new();
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            graph.add_edge(&nodes[from], &nodes[to], Attributes::new()).expect("edge");
        }
        nodes[1]
            .add_dependent(&nodes[4], Attributes::new(), true)
            .expect("b→x");
        (graph, nodes)
    }

    #[test]
    fn bfs_visits_by_distance() {
        let (graph, nodes) = diamond();
        assert_eq!(refs(graph.bfs(&nodes[0], Direction::Downstream, true)), vec!["a", "b", "c", "d"]);
        assert_eq!(refs(graph.bfs(&nodes[3], Direction::Upstream, true)), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn dfs_is_preorder() {
        let (graph, nodes) = diamond();
        assert_eq!(refs(graph.dfs(&nodes[0], Direction::Downstream, true)), vec!["a", "b", "d", "c"]);
        assert_eq!(refs(graph.dfs(&nodes[3], Direction::Upstream, true)), vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn unlimited_walks_leave_the_graph() {
        let (graph, nodes) = diamond();
        assert_eq!(
            refs(graph.bfs(&nodes[0], Direction::Downstream, false)),
            vec!["a", "b", "c", "d", "x"]
        );
        assert_eq!(
            refs(graph.dfs(&nodes[0], Direction::Downstream, false)),
            vec!["a", "b", "d", "x", "c"]
        );
    }

    #[test]
    fn non_member_start() {
        let (graph, nodes) = diamond();
        assert_eq!(graph.bfs(&nodes[4], Direction::Upstream, true).count(), 0);
        assert_eq!(graph.dfs(&nodes[4], Direction::Upstream, true).count(), 0);
        assert_eq!(refs(graph.dfs(&nodes[4], Direction::Upstream, false)), vec!["x", "b", "a"]);
    }

    #[test]
    fn walks_terminate_on_cycles() {
        let (graph, nodes) = diamond();
        nodes[0]
            .add_dependency(&nodes[3], Attributes::new(), false)
            .expect("d→a");
        assert_eq!(graph.bfs(&nodes[0], Direction::Downstream, true).count(), 4);
        assert_eq!(
            refs(graph.dfs(&nodes[1], Direction::Downstream, true)),
            vec!["b", "d", "a", "c"]
        );
    }

    #[test]
    fn walks_are_lazy() {
        let (graph, nodes) = diamond();
        let mut walk = graph.bfs(&nodes[0], Direction::Downstream, true);
        assert_eq!(walk.next().map(|n| *n.reference()), Some("a"));
        nodes[2].add_tag("seen");
        assert_eq!(walk.count(), 3);
    }
}
