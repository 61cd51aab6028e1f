//! Structural comparison of two graphs.
//!
//! Graphs are matched by node *reference*, not node identity, so two graphs
//! built from different node instances (for example a graph and its
//! restored snapshot) compare as equal when their content matches. If a
//! graph holds several members with the same reference, the first in
//! insertion order represents it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::graph::Graph;
use crate::node::{Attributes, Node, Reference};

/// Edge attribute carrying the [`DiffStatus`] in a [`Graph::diff_graph`].
pub const DIFF_STATUS_ATTRIBUTE: &str = "diff_status";

/// How an element changed between the two compared graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffStatus {
    /// Only in the newer graph.
    Added,
    /// Only in the older graph.
    Removed,
    /// In both, identical.
    Unchanged,
    /// In both, with different metadata or attributes.
    Modified,
}

impl DiffStatus {
    /// Lowercase name, as used in tags and attributes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Unchanged => "unchanged",
            Self::Modified => "modified",
        }
    }

    /// The `diff:<status>` tag applied by [`Graph::diff_graph`].
    #[must_use]
    pub fn tag(self) -> String {
        format!("diff:{}", self.as_str())
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata changes of a node present in both graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeChange<T> {
    /// The node's reference.
    pub reference: T,
    /// Tags only in the newer graph.
    pub tags_added: Vec<String>,
    /// Tags only in the older graph.
    pub tags_removed: Vec<String>,
    /// `(before, after)` when the duration changed.
    pub duration: Option<(Option<f64>, Option<f64>)>,
    /// `(before, after)` when the status changed.
    pub status: Option<(Option<String>, Option<String>)>,
}

impl<T> NodeChange<T> {
    fn is_empty(&self) -> bool {
        self.tags_added.is_empty()
            && self.tags_removed.is_empty()
            && self.duration.is_none()
            && self.status.is_none()
    }
}

/// Attribute changes of an edge present in both graphs.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeChange<T> {
    /// Dependency side.
    pub source: T,
    /// Dependent side.
    pub target: T,
    /// Attributes in the older graph.
    pub before: Attributes,
    /// Attributes in the newer graph.
    pub after: Attributes,
}

/// Result of [`Graph::diff`]. Every list is sorted by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDiff<T> {
    /// References only in the newer graph.
    pub added_nodes: Vec<T>,
    /// References only in the older graph.
    pub removed_nodes: Vec<T>,
    /// Nodes in both graphs whose metadata differs.
    pub modified_nodes: Vec<NodeChange<T>>,
    /// `(source, target)` edges only in the newer graph.
    pub added_edges: Vec<(T, T)>,
    /// `(source, target)` edges only in the older graph.
    pub removed_edges: Vec<(T, T)>,
    /// Edges in both graphs whose attributes differ.
    pub modified_edges: Vec<EdgeChange<T>>,
}

impl<T> GraphDiff<T> {
    /// Whether the graphs are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.modified_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.modified_edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

type EdgeMap<T> = BTreeMap<(T, T), Attributes>;

impl<T: Reference> Graph<T> {
    fn by_reference(&self) -> BTreeMap<T, Node<T>> {
        let mut map = BTreeMap::new();
        for node in self {
            map.entry(node.reference().clone())
                .or_insert_with(|| node.clone());
        }
        map
    }

    fn edge_map(&self) -> EdgeMap<T> {
        let mut map = BTreeMap::new();
        for (from, to, attrs) in self.edges() {
            if from.reference() != to.reference() {
                map.entry((from.reference().clone(), to.reference().clone()))
                    .or_insert(attrs);
            }
        }
        map
    }

    /// Compare this (older) graph with `other` (newer).
    #[must_use]
    #[instrument(skip_all, fields(old = self.len(), new = other.len()))]
    pub fn diff(&self, other: &Self) -> GraphDiff<T> {
        let old_nodes = self.by_reference();
        let new_nodes = other.by_reference();
        let old_edges = self.edge_map();
        let new_edges = other.edge_map();

        let added_nodes = new_nodes
            .keys()
            .filter(|r| !old_nodes.contains_key(*r))
            .cloned()
            .collect();
        let removed_nodes = old_nodes
            .keys()
            .filter(|r| !new_nodes.contains_key(*r))
            .cloned()
            .collect();
        let modified_nodes = old_nodes
            .iter()
            .filter_map(|(reference, old)| {
                let new = new_nodes.get(reference)?;
                let change = node_change(reference, old, new);
                (!change.is_empty()).then_some(change)
            })
            .collect();

        let added_edges = new_edges
            .keys()
            .filter(|e| !old_edges.contains_key(*e))
            .cloned()
            .collect();
        let removed_edges = old_edges
            .keys()
            .filter(|e| !new_edges.contains_key(*e))
            .cloned()
            .collect();
        let modified_edges = old_edges
            .iter()
            .filter_map(|((source, target), before)| {
                let after = new_edges.get(&(source.clone(), target.clone()))?;
                (before != after).then(|| EdgeChange {
                    source: source.clone(),
                    target: target.clone(),
                    before: before.clone(),
                    after: after.clone(),
                })
            })
            .collect();

        let diff = GraphDiff {
            added_nodes,
            removed_nodes,
            modified_nodes,
            added_edges,
            removed_edges,
            modified_edges,
        };
        debug!(
            added = diff.added_nodes.len(),
            removed = diff.removed_nodes.len(),
            modified = diff.modified_nodes.len(),
            "computed graph diff"
        );
        diff
    }

    /// A new graph over detached copies of the union of both memberships,
    /// annotated for rendering.
    ///
    /// Every node gets a `diff:<status>` tag and carries the newer metadata
    /// when present in both. Every edge gets a [`DIFF_STATUS_ATTRIBUTE`]
    /// attribute on top of its (newer) attributes. Neither input is mutated.
    #[must_use]
    #[instrument(skip_all, fields(old = self.len(), new = other.len()))]
    pub fn diff_graph(&self, other: &Self) -> Self {
        let old_nodes = self.by_reference();
        let new_nodes = other.by_reference();
        let old_edges = self.edge_map();
        let new_edges = other.edge_map();

        // Older membership first, then what the newer graph adds, both in
        // insertion order.
        let mut order: Vec<T> = Vec::new();
        let mut seen: BTreeSet<T> = BTreeSet::new();
        for node in self.iter().chain(other.iter()) {
            if seen.insert(node.reference().clone()) {
                order.push(node.reference().clone());
            }
        }

        let mut copies: BTreeMap<T, Node<T>> = BTreeMap::new();
        let mut result = Self::with_config(self.config().clone());
        for reference in order {
            let (copy, status) = match (old_nodes.get(&reference), new_nodes.get(&reference)) {
                (Some(old), Some(new)) => {
                    let status = if node_change(&reference, old, new).is_empty() {
                        DiffStatus::Unchanged
                    } else {
                        DiffStatus::Modified
                    };
                    (new.detached_copy(), status)
                }
                (None, Some(new)) => (new.detached_copy(), DiffStatus::Added),
                (Some(old), None) => (old.detached_copy(), DiffStatus::Removed),
                (None, None) => continue,
            };
            copy.add_tag(status.tag());
            result.add_node(&copy);
            copies.insert(reference, copy);
        }

        let mut keys: BTreeSet<&(T, T)> = old_edges.keys().collect();
        keys.extend(new_edges.keys());
        for key in keys {
            let (mut attrs, status) = match (old_edges.get(key), new_edges.get(key)) {
                (Some(before), Some(after)) if before == after => (after.clone(), DiffStatus::Unchanged),
                (Some(_), Some(after)) => (after.clone(), DiffStatus::Modified),
                (None, Some(after)) => (after.clone(), DiffStatus::Added),
                (Some(before), None) => (before.clone(), DiffStatus::Removed),
                (None, None) => continue,
            };
            attrs.insert(
                DIFF_STATUS_ATTRIBUTE.to_string(),
                Value::String(status.as_str().to_string()),
            );
            if let (Some(from), Some(to)) = (copies.get(&key.0), copies.get(&key.1)) {
                result.wire_unchecked(from, to, attrs);
            }
        }

        result
    }
}

fn node_change<T: Reference>(reference: &T, old: &Node<T>, new: &Node<T>) -> NodeChange<T> {
    let old_tags: BTreeSet<String> = old.tags().into_iter().collect();
    let new_tags: BTreeSet<String> = new.tags().into_iter().collect();
    let (old_duration, new_duration) = (old.duration(), new.duration());
    let (old_status, new_status) = (old.status(), new.status());

    NodeChange {
        reference: reference.clone(),
        tags_added: new_tags.difference(&old_tags).cloned().collect(),
        tags_removed: old_tags.difference(&new_tags).cloned().collect(),
        duration: (old_duration != new_duration).then_some((old_duration, new_duration)),
        status: (old_status != new_status).then_some((old_status, new_status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn edge(graph: &mut Graph<&'static str>, from: &Node<&'static str>, to: &Node<&'static str>) {
        graph.add_edge(from, to, Attributes::new()).expect("edge");
    }

    #[test]
    fn added_node_and_edge() {
        // G1 = {A, B, A→B}; G2 = G1 + C, B→C.
        let a = Node::new("A");
        let b = Node::new("B");
        let mut g1 = Graph::new();
        edge(&mut g1, &a, &b);

        let mut g2 = g1.clone_graph(true);
        let b2 = g2.find(&"B").expect("B");
        let c = Node::new("C");
        edge(&mut g2, &b2, &c);

        let diff = g1.diff(&g2);
        assert_eq!(diff.added_nodes, vec!["C"]);
        assert_eq!(diff.added_edges, vec![("B", "C")]);
        assert!(diff.removed_nodes.is_empty());
        assert!(diff.removed_edges.is_empty());
        assert!(diff.modified_nodes.is_empty());

        let reverse = g2.diff(&g1);
        assert_eq!(reverse.removed_nodes, vec!["C"]);
        assert_eq!(reverse.removed_edges, vec![("B", "C")]);
    }

    #[test]
    fn identical_content_is_empty_diff() {
        let a = Node::new("A");
        let b = Node::new("B");
        let mut graph = Graph::new();
        edge(&mut graph, &a, &b);
        assert!(graph.diff(&graph.clone_graph(true)).is_empty());
    }

    #[test]
    fn metadata_and_attribute_changes() {
        let a = Node::new("A");
        let b = Node::new("B");
        a.add_tag("old");
        a.set_duration(1.0).expect("duration");
        let mut g1 = Graph::new();
        let attrs: Attributes = [("weight".to_string(), json!(1))].into_iter().collect();
        g1.add_edge(&a, &b, attrs).expect("edge");

        let g2 = g1.clone_graph(true);
        let a2 = g2.find(&"A").expect("A");
        let b2 = g2.find(&"B").expect("B");
        a2.remove_tag("old");
        a2.add_tag("new");
        a2.set_duration(2.0).expect("duration");
        b2.set_status("done");
        a2.set_edge_attribute(&b2, "weight", json!(5)).expect("attr");

        let diff = g1.diff(&g2);
        assert_eq!(diff.modified_nodes.len(), 2);
        let change_a = &diff.modified_nodes[0];
        assert_eq!(change_a.reference, "A");
        assert_eq!(change_a.tags_added, vec!["new".to_string()]);
        assert_eq!(change_a.tags_removed, vec!["old".to_string()]);
        assert_eq!(change_a.duration, Some((Some(1.0), Some(2.0))));
        assert_eq!(diff.modified_nodes[1].status, Some((None, Some("done".to_string()))));

        assert_eq!(diff.modified_edges.len(), 1);
        assert_eq!(diff.modified_edges[0].before["weight"], json!(1));
        assert_eq!(diff.modified_edges[0].after["weight"], json!(5));
    }

    #[test]
    fn diff_graph_annotates_union() {
        let a = Node::new("A");
        let b = Node::new("B");
        let gone = Node::new("Gone");
        let mut g1 = Graph::new();
        edge(&mut g1, &a, &b);
        edge(&mut g1, &gone, &a);

        let mut g2 = Graph::new();
        let a2 = Node::new("A");
        let b2 = Node::new("B");
        let c2 = Node::new("C");
        b2.set_status("changed");
        edge(&mut g2, &a2, &b2);
        edge(&mut g2, &b2, &c2);

        let annotated = g1.diff_graph(&g2);
        let names: Vec<&str> = annotated.iter().map(|n| *n.reference()).collect();
        assert_eq!(names, vec!["A", "B", "Gone", "C"]);

        let tag_of = |name: &'static str| -> Vec<String> {
            annotated
                .find(&name)
                .map(|n| n.tags())
                .unwrap_or_default()
        };
        assert_eq!(tag_of("A"), vec!["diff:unchanged".to_string()]);
        assert_eq!(tag_of("B"), vec!["diff:modified".to_string()]);
        assert_eq!(tag_of("C"), vec!["diff:added".to_string()]);
        assert_eq!(tag_of("Gone"), vec!["diff:removed".to_string()]);

        let status = |from: &'static str, to: &'static str| -> Value {
            let u = annotated.find(&from).expect("source");
            let v = annotated.find(&to).expect("target");
            u.edge_attributes(&v).expect("edge")[DIFF_STATUS_ATTRIBUTE].clone()
        };
        assert_eq!(status("A", "B"), json!("unchanged"));
        assert_eq!(status("B", "C"), json!("added"));
        assert_eq!(status("Gone", "A"), json!("removed"));

        assert_eq!(g1.len(), 3, "inputs untouched");
        assert!(a.tags().is_empty());
    }
}
