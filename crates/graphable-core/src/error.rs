//! Error types for node, graph and snapshot operations.
//!
//! Every failure is reported synchronously at the offending call; operations
//! validate before mutating, so an `Err` always means "nothing changed".

use std::fmt;

// ---------------------------------------------------------------------------
// Machine-readable error codes
// ---------------------------------------------------------------------------

/// Machine-readable codes for [`GraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphErrorCode {
    /// A relation or edge would close a cycle, or an algorithm that needs a
    /// DAG found one.
    CycleDetected,
    /// A node was asked to depend on itself.
    SelfRelation,
    /// A node or relation referenced by a read or remove does not exist.
    NotFound,
    /// Scalar metadata (duration) was given an invalid value.
    InvalidMetadata,
    /// Mirrored relation maps disagree.
    Inconsistent,
    /// An embedded checksum did not match the restored graph.
    ChecksumMismatch,
}

impl GraphErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CycleDetected => "E2003",
            Self::SelfRelation => "E2006",
            Self::NotFound => "E2001",
            Self::InvalidMetadata => "E2005",
            Self::Inconsistent => "E3003",
            Self::ChecksumMismatch => "E3004",
        }
    }

    /// Short human-facing summary for logs.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::CycleDetected => "Dependency cycle detected",
            Self::SelfRelation => "Node cannot depend on itself",
            Self::NotFound => "Node or relation not found",
            Self::InvalidMetadata => "Invalid node metadata",
            Self::Inconsistent => "Relation maps are inconsistent",
            Self::ChecksumMismatch => "Checksum mismatch",
        }
    }
}

impl fmt::Display for GraphErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the graph core.
///
/// Node references are carried in their `Display` form so the error type
/// stays independent of the reference type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A cycle was found or would be created.
    ///
    /// For a rejected relation `from -> to` the path reads
    /// `from -> to -> ... -> from`. For ordering algorithms it is the residual
    /// set of nodes that could not be placed.
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle {
        /// The nodes forming (or witnessing) the cycle.
        cycle: Vec<String>,
    },

    /// A node was asked to depend on itself.
    #[error("node '{node}' cannot depend on itself")]
    SelfRelation {
        /// The offending node.
        node: String,
    },

    /// No relation `dependency -> dependent` exists.
    #[error("no relation between '{dependency}' and '{dependent}'")]
    RelationNotFound {
        /// The dependency side of the requested relation.
        dependency: String,
        /// The dependent side of the requested relation.
        dependent: String,
    },

    /// A node is not a member of the graph (or not present in a snapshot).
    #[error("node '{node}' not found")]
    NodeNotFound {
        /// The missing node.
        node: String,
    },

    /// A duration was negative or not finite.
    #[error("invalid duration {value} for node '{node}': must be finite and non-negative")]
    InvalidDuration {
        /// The node whose duration was rejected.
        node: String,
        /// The rejected value.
        value: f64,
    },

    /// The mirrored dependency/dependent maps disagree.
    #[error("inconsistent relations: {detail}")]
    Inconsistent {
        /// Which relation is missing its mirror.
        detail: String,
    },

    /// A restored graph did not hash to its embedded checksum.
    #[error("checksum mismatch: expected={expected} actual={actual}")]
    ChecksumMismatch {
        /// The checksum carried by the snapshot.
        expected: String,
        /// The checksum of the restored graph.
        actual: String,
    },
}

impl GraphError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> GraphErrorCode {
        match self {
            Self::Cycle { .. } => GraphErrorCode::CycleDetected,
            Self::SelfRelation { .. } => GraphErrorCode::SelfRelation,
            Self::RelationNotFound { .. } | Self::NodeNotFound { .. } => GraphErrorCode::NotFound,
            Self::InvalidDuration { .. } => GraphErrorCode::InvalidMetadata,
            Self::Inconsistent { .. } => GraphErrorCode::Inconsistent,
            Self::ChecksumMismatch { .. } => GraphErrorCode::ChecksumMismatch,
        }
    }

    /// The cycle path carried by a [`GraphError::Cycle`], if any.
    #[must_use]
    pub fn cycle(&self) -> Option<&[String]> {
        match self {
            Self::Cycle { cycle } => Some(cycle),
            _ => None,
        }
    }
}

/// Shorthand result type for graph operations.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            GraphErrorCode::CycleDetected,
            GraphErrorCode::SelfRelation,
            GraphErrorCode::NotFound,
            GraphErrorCode::InvalidMetadata,
            GraphErrorCode::Inconsistent,
            GraphErrorCode::ChecksumMismatch,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn cycle_error_renders_path() {
        let err = GraphError::Cycle {
            cycle: vec!["C".into(), "A".into(), "B".into(), "C".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: C -> A -> B -> C");
        assert_eq!(err.code(), GraphErrorCode::CycleDetected);
        assert_eq!(err.cycle().map(<[String]>::len), Some(4));
    }

    #[test]
    fn not_found_variants_share_a_code() {
        let relation = GraphError::RelationNotFound {
            dependency: "a".into(),
            dependent: "b".into(),
        };
        let node = GraphError::NodeNotFound { node: "a".into() };
        assert_eq!(relation.code(), node.code());
        assert!(node.cycle().is_none());
    }
}
