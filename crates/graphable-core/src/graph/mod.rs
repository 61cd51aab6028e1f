//! Graphs: explicit membership sets over shared nodes.
//!
//! # Overview
//!
//! A [`Graph`] does not own the relations between its nodes; those live on
//! the nodes themselves and may reach outside the graph. What the graph owns
//! is its *membership*: the ordered set of nodes it claims to represent.
//! Every whole-graph computation (orderings, cycle checks on `add_edge`,
//! checksum, slicing) only sees relations whose two endpoints are members.
//!
//! ## Cache Invalidation
//!
//! Topological order, layered order and checksum are memoized. Each graph
//! registers a [`CacheObserver`] on every member; node mutations clear
//! the caches they affect (see [`Change`]). Membership changes clear
//! everything.
//!
//! ## Submodules
//!
//! ```text
//! project        membership-scoped petgraph projection used by the algorithms
//! order          topological and layered order (Kahn)
//! cycles         integrity checks, SCCs, cycle break suggestions
//! reduce         transitive reduction and closure
//! critical_path  critical path method
//! slice          upstream/downstream/between slices, simple path enumeration
//! traverse       lazy BFS/DFS walks, optionally leaving the membership
//! diff           structural comparison of two graphs
//! checksum       canonical BLAKE3 digest
//! ```

pub mod checksum;
pub mod critical_path;
pub mod cycles;
pub mod diff;
pub mod order;
pub(crate) mod project;
pub mod reduce;
pub mod slice;
pub mod traverse;

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, instrument};

use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::node::observer::{CacheObserver, Change, ObserverId};
use crate::node::{self, Attributes, Direction, Node, NodeId, Reference};

pub use critical_path::{CpmReport, NodeTiming};
pub use cycles::CycleReport;
pub use diff::{DiffStatus, EdgeChange, GraphDiff, NodeChange};
pub use slice::AllPaths;
pub use traverse::Traversal;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoized derived views, shared with member nodes as an observer.
pub(crate) struct GraphCache<T> {
    pub(crate) topological: RefCell<Option<Vec<Node<T>>>>,
    pub(crate) layers: RefCell<Option<Vec<Vec<Node<T>>>>>,
    pub(crate) checksum: RefCell<Option<String>>,
}

impl<T> Default for GraphCache<T> {
    fn default() -> Self {
        Self {
            topological: RefCell::new(None),
            layers: RefCell::new(None),
            checksum: RefCell::new(None),
        }
    }
}

impl<T> CacheObserver for GraphCache<T> {
    fn invalidate(&self, change: Change) {
        if change.affects_structure() {
            let stale_order = self.topological.borrow_mut().take();
            let stale_layers = self.layers.borrow_mut().take();
            drop((stale_order, stale_layers));
        }
        self.checksum.borrow_mut().take();
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// An ordered membership set of shared [`Node`]s with memoized analyses.
pub struct Graph<T: Reference> {
    members: IndexMap<NodeId, Node<T>>,
    observer_id: ObserverId,
    cache: Rc<GraphCache<T>>,
    config: GraphConfig,
}

impl<T: Reference> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Reference> std::fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("members", &self.members.values().collect::<Vec<_>>())
            .field("observer_id", &self.observer_id)
            .finish_non_exhaustive()
    }
}

impl<T: Reference> Drop for Graph<T> {
    fn drop(&mut self) {
        for node in self.members.values() {
            node.unregister_observer(self.observer_id);
        }
    }
}

impl<T: Reference> Graph<T> {
    /// Create an empty graph with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            members: IndexMap::new(),
            observer_id: ObserverId::new(),
            cache: Rc::new(GraphCache::default()),
            config,
        }
    }

    /// Create a graph over `nodes` with default configuration.
    #[must_use]
    pub fn from_nodes<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a Node<T>>,
    {
        Self::from_nodes_with_config(nodes, GraphConfig::default())
    }

    /// Create a graph over `nodes`, running [`Graph::discover`] afterwards
    /// when `config.discover_on_build` is set.
    #[must_use]
    pub fn from_nodes_with_config<'a, I>(nodes: I, config: GraphConfig) -> Self
    where
        I: IntoIterator<Item = &'a Node<T>>,
    {
        let discover = config.discover_on_build;
        let mut graph = Self::with_config(config);
        for node in nodes {
            graph.add_node(node);
        }
        if discover {
            graph.discover();
        }
        graph
    }

    /// Like [`Graph::from_nodes_with_config`], then validated: every
    /// member relation must be mirrored on both endpoints and the members
    /// must not form a cycle.
    ///
    /// # Errors
    ///
    /// [`GraphError::Inconsistent`] or [`GraphError::Cycle`] from
    /// [`Graph::check_consistency`] and [`Graph::check_cycles`].
    pub fn try_from_nodes<'a, I>(nodes: I, config: GraphConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Node<T>>,
    {
        let graph = Self::from_nodes_with_config(nodes, config);
        graph.check_consistency()?;
        graph.check_cycles()?;
        Ok(graph)
    }

    /// A graph with the same configuration over a selection of this graph's
    /// (shared) nodes.
    pub(crate) fn sharing<'a, I>(&self, nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a Node<T>>,
    {
        let mut graph = Self::with_config(self.config.clone());
        for node in nodes {
            graph.add_node(node);
        }
        graph
    }

    /// The configuration this graph was built with.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the graph has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `node` is a member.
    #[must_use]
    pub fn contains(&self, node: &Node<T>) -> bool {
        self.members.contains_key(&node.id())
    }

    /// Whether some member carries `reference`.
    #[must_use]
    pub fn contains_reference(&self, reference: &T) -> bool {
        self.find(reference).is_some()
    }

    /// The first member (in insertion order) carrying `reference`.
    #[must_use]
    pub fn find(&self, reference: &T) -> Option<Node<T>> {
        self.members
            .values()
            .find(|node| node.reference() == reference)
            .cloned()
    }

    /// Members in insertion order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node<T>> {
        self.members.values().cloned().collect()
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Node<T>> {
        self.members.values()
    }

    /// Add `node` to the membership. Returns `false` if it was already a
    /// member.
    pub fn add_node(&mut self, node: &Node<T>) -> bool {
        if self.contains(node) {
            return false;
        }
        let observer: Rc<dyn CacheObserver> = self.cache.clone();
        node.register_observer(self.observer_id, Rc::downgrade(&observer));
        self.members.insert(node.id(), node.clone());
        self.cache.invalidate(Change::Structure);
        debug!(node = %node, members = self.members.len(), "added node to graph");
        true
    }

    /// Remove `node` from the membership. Its relations are left intact since
    /// the node may belong to other graphs. Returns `false` if it was not a
    /// member.
    pub fn remove_node(&mut self, node: &Node<T>) -> bool {
        let Some(removed) = self.members.shift_remove(&node.id()) else {
            return false;
        };
        removed.unregister_observer(self.observer_id);
        self.cache.invalidate(Change::Structure);
        debug!(node = %removed, members = self.members.len(), "removed node from graph");
        true
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Add the edge `a → b` (b depends on a), adding missing endpoints to the
    /// membership.
    ///
    /// Cycle checking is always on and only follows relations between
    /// members. Nothing changes when the edge is rejected.
    ///
    /// # Errors
    ///
    /// [`GraphError::SelfRelation`] when `a` is `b`; [`GraphError::Cycle`]
    /// with the path `a → b → ... → a` when the edge would close a loop.
    pub fn add_edge(&mut self, a: &Node<T>, b: &Node<T>, attributes: Attributes) -> Result<()> {
        if a == b {
            return Err(GraphError::SelfRelation { node: a.label() });
        }
        let cycle = node::closing_cycle(a, b, |n| self.contains(n) || n == a || n == b);
        if let Some(cycle) = cycle {
            return Err(node::cycle_error(&cycle));
        }

        self.add_node(a);
        self.add_node(b);
        node::link_unchecked(a, b, attributes);
        Ok(())
    }

    /// Wire `a → b` between (new) members without a cycle check. Used when
    /// building result graphs whose edge sets are already known to be valid.
    pub(crate) fn wire_unchecked(&mut self, a: &Node<T>, b: &Node<T>, attributes: Attributes) {
        self.add_node(a);
        self.add_node(b);
        node::link_unchecked(a, b, attributes);
    }

    /// Remove the edge `a → b`, returning its attributes.
    ///
    /// # Errors
    ///
    /// [`GraphError::NodeNotFound`] if either endpoint is not a member;
    /// [`GraphError::RelationNotFound`] if there is no such edge.
    pub fn remove_edge(&mut self, a: &Node<T>, b: &Node<T>) -> Result<Attributes> {
        for endpoint in [a, b] {
            if !self.contains(endpoint) {
                return Err(GraphError::NodeNotFound {
                    node: endpoint.label(),
                });
            }
        }
        node::unlink(a, b)
    }

    /// Edges between members as `(dependency, dependent, attributes)`, in
    /// member insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<(Node<T>, Node<T>, Attributes)> {
        self.members
            .values()
            .flat_map(|from| {
                from.dependents_with_attributes()
                    .into_iter()
                    .filter(move |(to, _)| self.contains(to))
                    .map(move |(to, attrs)| (from.clone(), to, attrs))
            })
            .collect()
    }

    /// Number of edges between members.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.members
            .values()
            .map(|from| {
                from.dependents()
                    .iter()
                    .filter(|to| self.contains(to))
                    .count()
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Neighbourhood and reachability
    // -----------------------------------------------------------------------

    /// Direct neighbours of `node` in `direction` that are members, with the
    /// attributes of the connecting edge.
    #[must_use]
    pub fn neighbors(&self, node: &Node<T>, direction: Direction) -> Vec<(Node<T>, Attributes)> {
        let related = match direction {
            Direction::Upstream => node.dependencies_with_attributes(),
            Direction::Downstream => node.dependents_with_attributes(),
        };
        related
            .into_iter()
            .filter(|(other, _)| self.contains(other))
            .collect()
    }

    /// Members with no in-graph dependencies.
    #[must_use]
    pub fn sources(&self) -> Vec<Node<T>> {
        self.members
            .values()
            .filter(|node| !node.dependencies().iter().any(|dep| self.contains(dep)))
            .cloned()
            .collect()
    }

    /// Members with no in-graph dependents.
    #[must_use]
    pub fn sinks(&self) -> Vec<Node<T>> {
        self.members
            .values()
            .filter(|node| !node.dependents().iter().any(|dep| self.contains(dep)))
            .cloned()
            .collect()
    }

    /// Members reachable from `node` in `direction`, excluding `node` itself
    /// (unless it lies on a cycle), in member insertion order.
    pub(crate) fn reachable(&self, node: &Node<T>, direction: Direction) -> Vec<Node<T>> {
        if !self.contains(node) {
            return Vec::new();
        }
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<Node<T>> = VecDeque::from([node.clone()]);
        while let Some(current) = queue.pop_front() {
            for next in current.neighbors(direction) {
                if self.contains(&next) && seen.insert(next.id()) {
                    queue.push_back(next);
                }
            }
        }
        self.members
            .values()
            .filter(|member| seen.contains(&member.id()))
            .cloned()
            .collect()
    }

    /// In-graph ancestors of `node` (everything it transitively depends on).
    #[must_use]
    pub fn ancestors(&self, node: &Node<T>) -> Vec<Node<T>> {
        self.reachable(node, Direction::Upstream)
    }

    /// In-graph descendants of `node` (everything that transitively depends on
    /// it).
    #[must_use]
    pub fn descendants(&self, node: &Node<T>) -> Vec<Node<T>> {
        self.reachable(node, Direction::Downstream)
    }

    /// Whether `b` is reachable from `a` through in-graph edges.
    #[must_use]
    pub fn is_ancestor_of(&self, a: &Node<T>, b: &Node<T>) -> bool {
        a != b
            && self.contains(a)
            && self.contains(b)
            && node::shortest_path(a, b, |n| self.contains(n)).is_some()
    }

    /// Whether `a` is reachable from `b` through in-graph edges.
    #[must_use]
    pub fn is_descendant_of(&self, a: &Node<T>, b: &Node<T>) -> bool {
        self.is_ancestor_of(b, a)
    }

    // -----------------------------------------------------------------------
    // Membership expansion and copies
    // -----------------------------------------------------------------------

    /// Expand the membership with every direct dependency and dependent of
    /// the current members, repeated until nothing new is added. Relations
    /// are followed regardless of graph boundaries.
    ///
    /// Returns the number of nodes added.
    #[instrument(skip_all, fields(members = self.members.len()))]
    pub fn discover(&mut self) -> usize {
        let before = self.members.len();
        let mut frontier: Vec<Node<T>> = self.nodes();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for current in &frontier {
                for related in current
                    .dependencies()
                    .into_iter()
                    .chain(current.dependents())
                {
                    if self.add_node(&related) {
                        next.push(related);
                    }
                }
            }
            frontier = next;
        }
        let added = self.members.len() - before;
        if added > 0 {
            info!(added, members = self.members.len(), "discovered related nodes");
        }
        added
    }

    /// A new graph with the same configuration over detached copies of the
    /// members, optionally copying the in-graph edges and their attributes.
    #[must_use]
    pub fn clone_graph(&self, include_edges: bool) -> Self {
        let copies: IndexMap<NodeId, Node<T>> = self
            .members
            .iter()
            .map(|(id, node)| (*id, node.detached_copy()))
            .collect();
        let mut graph = Self::with_config(self.config.clone());
        for copy in copies.values() {
            graph.add_node(copy);
        }
        if include_edges {
            for (from, to, attrs) in self.edges() {
                if let (Some(a), Some(b)) = (copies.get(&from.id()), copies.get(&to.id())) {
                    graph.wire_unchecked(a, b, attrs);
                }
            }
        }
        graph
    }

    /// Members passing `predicate`, then [`Graph::discover`]ed.
    #[must_use]
    pub fn subgraph_filtered<F>(&self, predicate: F) -> Self
    where
        F: Fn(&Node<T>) -> bool,
    {
        let mut graph = self.sharing(self.members.values().filter(|n| predicate(n)));
        graph.discover();
        graph
    }

    /// Members carrying `tag`, then [`Graph::discover`]ed.
    #[must_use]
    pub fn subgraph_tagged(&self, tag: &str) -> Self {
        self.subgraph_filtered(|node| node.has_tag(tag))
    }
}

impl<'a, T: Reference> IntoIterator for &'a Graph<T> {
    type Item = &'a Node<T>;
    type IntoIter = indexmap::map::Values<'a, NodeId, Node<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.values()
    }
}
