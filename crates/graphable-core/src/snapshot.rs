//! Serializable graph snapshots.
//!
//! A [`GraphSnapshot`] is the plain-data form of a graph: node records,
//! edge records and optionally the checksum at capture time. Exporters and
//! parsers for concrete formats convert to and from this type with serde
//! and never touch the node/graph internals.
//!
//! ```rust,ignore
//! let snapshot = GraphSnapshot::capture(&graph);
//! let json = serde_json::to_string(&snapshot)?;
//! let restored = serde_json::from_str::<GraphSnapshot<String>>(&json)?.restore_verified()?;
//! assert!(restored.is_equal_to(&graph));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::node::{Attributes, Node, Reference};

/// One node and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord<R> {
    /// The node's reference.
    pub reference: R,
    /// Tags in lexicographic order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Optional duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Optional status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One edge `source → target` (target depends on source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord<R> {
    /// Dependency side.
    pub source: R,
    /// Dependent side.
    pub target: R,
    /// Edge attributes.
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Plain-data form of a graph's members and in-graph edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot<R> {
    /// Members in insertion order.
    pub nodes: Vec<NodeRecord<R>>,
    /// In-graph edges, grouped by source in member order.
    #[serde(default)]
    pub edges: Vec<EdgeRecord<R>>,
    /// Checksum of the captured graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl<R: Reference> GraphSnapshot<R> {
    /// Record `graph`, including its checksum.
    #[must_use]
    pub fn capture(graph: &Graph<R>) -> Self {
        let nodes = graph
            .iter()
            .map(|node| NodeRecord {
                reference: node.reference().clone(),
                tags: node.tags(),
                duration: node.duration(),
                status: node.status(),
            })
            .collect();
        let edges = graph
            .edges()
            .into_iter()
            .map(|(source, target, attributes)| EdgeRecord {
                source: source.reference().clone(),
                target: target.reference().clone(),
                attributes,
            })
            .collect();
        Self {
            nodes,
            edges,
            checksum: Some(graph.checksum()),
        }
    }

    /// Drop the recorded checksum.
    #[must_use]
    pub fn without_checksum(mut self) -> Self {
        self.checksum = None;
        self
    }

    /// Build a new graph with default configuration.
    ///
    /// # Errors
    ///
    /// See [`GraphSnapshot::restore_with_config`].
    pub fn restore(&self) -> Result<Graph<R>> {
        self.restore_with_config(GraphConfig::default())
    }

    /// Build a new graph from the records. Edges are added through
    /// [`Graph::add_edge`], so they are cycle-checked. A reference recorded
    /// twice maps to the first record.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidDuration`] for a bad duration,
    /// [`GraphError::NodeNotFound`] for an edge endpoint without a node
    /// record, and any error of [`Graph::add_edge`].
    pub fn restore_with_config(&self, config: GraphConfig) -> Result<Graph<R>> {
        let mut graph = Graph::with_config(config);
        let mut by_reference: HashMap<&R, Node<R>> = HashMap::with_capacity(self.nodes.len());

        for record in &self.nodes {
            if by_reference.contains_key(&record.reference) {
                warn!(reference = %record.reference, "duplicate node record ignored");
                continue;
            }
            let node = Node::new(record.reference.clone());
            for tag in &record.tags {
                node.add_tag(tag.clone());
            }
            if let Some(duration) = record.duration {
                node.set_duration(duration)?;
            }
            if let Some(status) = &record.status {
                node.set_status(status.clone());
            }
            graph.add_node(&node);
            by_reference.insert(&record.reference, node);
        }

        for edge in &self.edges {
            let lookup = |reference: &R| {
                by_reference
                    .get(reference)
                    .ok_or_else(|| GraphError::NodeNotFound {
                        node: reference.to_string(),
                    })
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;
            graph.add_edge(source, target, edge.attributes.clone())?;
        }

        debug!(nodes = graph.len(), edges = self.edges.len(), "restored graph snapshot");
        Ok(graph)
    }

    /// Restore, then check the result against the recorded checksum (if
    /// any).
    ///
    /// # Errors
    ///
    /// [`GraphError::ChecksumMismatch`] when the checksums differ, or any
    /// error of [`GraphSnapshot::restore`].
    pub fn restore_verified(&self) -> Result<Graph<R>> {
        let graph = self.restore()?;
        if let Some(expected) = &self.checksum {
            let actual = graph.checksum();
            if actual != *expected {
                warn!(expected = %expected, actual = %actual, "snapshot checksum mismatch");
                return Err(GraphError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(graph)
    }
}
