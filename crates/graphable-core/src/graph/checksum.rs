//! Canonical content digest.
//!
//! The checksum covers, for every member: its reference, duration, status,
//! tags, and its in-graph dependents with the attributes of each edge.
//! Each member is rendered to one NUL-separated record: tags sorted,
//! attributes sorted by key with values as compact JSON, and dependent
//! entries sorted by their whole rendering. Records are hashed in sorted
//! order, so the digest depends neither on insertion order (even when
//! references repeat) nor on the process that computes it.
//!
//! The format is `blake3:<hex>`.

use tracing::{debug, instrument};

use crate::graph::Graph;
use crate::node::{Node, Reference};

const FIELD_SEPARATOR: &[u8] = b"\0";

impl<T: Reference> Graph<T> {
    /// The canonical digest of the members and in-graph edges. Cached until
    /// any member changes.
    #[must_use]
    pub fn checksum(&self) -> String {
        if let Some(checksum) = self.cache.checksum.borrow().as_ref() {
            return checksum.clone();
        }
        let checksum = self.compute_checksum();
        *self.cache.checksum.borrow_mut() = Some(checksum.clone());
        checksum
    }

    /// Whether [`Graph::checksum`] equals `expected`. Never fails.
    #[must_use]
    pub fn validate_checksum(&self, expected: &str) -> bool {
        self.checksum() == expected
    }

    /// Whether two graphs have identical canonical content.
    #[must_use]
    pub fn is_equal_to(&self, other: &Self) -> bool {
        self.checksum() == other.checksum()
    }

    #[instrument(skip_all, fields(members = self.len()))]
    fn compute_checksum(&self) -> String {
        let mut records: Vec<Vec<u8>> = self.iter().map(|node| self.record(node)).collect();
        records.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for record in &records {
            hasher.update(record);
        }

        let checksum = format!("blake3:{}", hasher.finalize().to_hex());
        debug!(checksum = %checksum, "computed graph checksum");
        checksum
    }

    /// Every hashed field of one member, dependents sorted by their full
    /// rendering so members sharing a label still order deterministically.
    fn record(&self, node: &Node<T>) -> Vec<u8> {
        let mut record = Vec::new();
        field(&mut record, "node", &node.label());
        field(
            &mut record,
            "duration",
            &node.duration().map_or_else(|| "-".to_string(), |d| d.to_string()),
        );
        field(&mut record, "status", node.status().as_deref().unwrap_or("-"));
        for tag in node.tags() {
            field(&mut record, "tag", &tag);
        }

        let mut edges: Vec<Vec<u8>> = node
            .dependents_with_attributes()
            .into_iter()
            .filter(|(dependent, _)| self.contains(dependent))
            .map(|(dependent, attrs)| {
                let mut edge = Vec::new();
                field(&mut edge, "edge", &dependent.label());
                for (key, value) in &attrs {
                    field(&mut edge, "attr", key);
                    field(&mut edge, "value", &value.to_string());
                }
                edge
            })
            .collect();
        edges.sort_unstable();
        for edge in edges {
            record.extend(edge);
        }
        record
    }
}

fn field(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(FIELD_SEPARATOR);
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(FIELD_SEPARATOR);
}
