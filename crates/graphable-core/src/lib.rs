#![forbid(unsafe_code)]
//! graphable-core library.
//!
//! Dependency graphs over shared nodes, with memoized analyses that stay
//! correct under mutation.
//!
//! # Model
//!
//! - [`Node`]: a vertex carrying a caller-supplied reference, tags, an
//!   optional duration and status, and both halves of every relation it takes
//!   part in. An edge `u → v` means "v depends on u".
//! - [`Graph`]: an ordered membership set of nodes. All whole-graph
//!   algorithms only see relations between members.
//! - [`node::observer`]: the cache invalidation protocol. Graphs observe their
//!   members and drop memoized results when a member changes.
//! - [`snapshot::GraphSnapshot`]: serde form used by format adapters.
//!
//! # Conventions
//!
//! - **Errors**: graph operations return [`Result`] with [`GraphError`];
//!   configuration loading uses `anyhow::Result`.
//! - **Logging**: `tracing` macros (`debug!` per mutation, `info!` for
//!   whole-graph transforms, `warn!` for rejected cycles). The library never
//!   installs a subscriber.
//! - **Threading**: nodes and graphs are single-threaded (`Rc`/`RefCell`).
//!
//! # Example
//!
//! ```rust
//! use graphable_core::{Attributes, Graph, Node};
//!
//! let a = Node::new("A");
//! let b = Node::new("B");
//! let c = Node::new("C");
//!
//! let mut graph = Graph::new();
//! graph.add_edge(&a, &b, Attributes::new()).unwrap();
//! graph.add_edge(&b, &c, Attributes::new()).unwrap();
//!
//! let order: Vec<_> = graph
//!     .topological_order()
//!     .unwrap()
//!     .iter()
//!     .map(|n| *n.reference())
//!     .collect();
//! assert_eq!(order, ["A", "B", "C"]);
//!
//! // Closing the loop is rejected and leaves the graph untouched.
//! assert!(graph.add_edge(&c, &a, Attributes::new()).is_err());
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod node;
pub mod snapshot;

pub use config::GraphConfig;
pub use error::{GraphError, GraphErrorCode, Result};
pub use graph::{AllPaths, CpmReport, CycleReport, DiffStatus, Graph, GraphDiff, NodeTiming, Traversal};
pub use node::observer::{CacheObserver, Change, ObserverId};
pub use node::{Attributes, Direction, Node, NodeId, Reference};
pub use snapshot::GraphSnapshot;
