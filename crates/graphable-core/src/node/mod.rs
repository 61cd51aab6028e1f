//! Graph nodes.
//!
//! # Edge Direction
//!
//! An edge `u → v` means "v depends on u": u is required by v and must come
//! first. Each node records both halves of every relation it takes part in:
//!
//! - `dependencies`: the nodes it depends on (incoming edges),
//! - `dependents`: the nodes that depend on it (outgoing edges).
//!
//! Both halves carry the same attribute map and are always updated together.
//!
//! # Ownership
//!
//! Node state lives in a registry shared by every node it has been linked
//! with, and relations are stored there as [`NodeId`] pairs. Neither side of
//! a relation owns the other. A handle to any node keeps its whole connected
//! set alive, upstream and downstream alike, and loops are freed like
//! anything else. Linking nodes from two registries moves the smaller one
//! into the larger. Removing a relation never splits a registry: its nodes
//! stay alive until the last handle into it is dropped.
//!
//! # Identity
//!
//! Two [`Node`] handles are equal iff they point to the same node. The
//! caller-supplied reference is carried along but is not the identity:
//! graphs match nodes by reference only when comparing two graphs
//! ([`crate::graph::Graph::diff`]).

pub mod observer;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{GraphError, Result};
use observer::{CacheObserver, Change, ObserverId, Observers};

/// Per-relation attributes (weight, label, ...), kept sorted by key.
pub type Attributes = BTreeMap<String, Value>;

/// Requirements on the caller-supplied node reference.
///
/// `Display` is the canonical textual form used in error messages and in the
/// checksum; `Ord` makes diff output deterministic.
pub trait Reference: Clone + Eq + Hash + Ord + fmt::Display + fmt::Debug + 'static {}

impl<T> Reference for T where T: Clone + Eq + Hash + Ord + fmt::Display + fmt::Debug + 'static {}

/// Unique identifier of a node, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards dependencies (ancestors).
    Upstream,
    /// Towards dependents (descendants).
    Downstream,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The immutable part of a node.
pub(crate) struct Identity<T> {
    id: NodeId,
    reference: T,
}

struct Entry<T> {
    identity: Rc<Identity<T>>,
    tags: BTreeSet<String>,
    duration: Option<f64>,
    status: Option<String>,
    dependencies: IndexMap<NodeId, Attributes>,
    dependents: IndexMap<NodeId, Attributes>,
    observers: Observers,
}

impl<T> Entry<T> {
    fn new(identity: Rc<Identity<T>>) -> Self {
        Self {
            identity,
            tags: BTreeSet::new(),
            duration: None,
            status: None,
            dependencies: IndexMap::new(),
            dependents: IndexMap::new(),
            observers: Observers::default(),
        }
    }

    const fn relations(&self, direction: Direction) -> &IndexMap<NodeId, Attributes> {
        match direction {
            Direction::Upstream => &self.dependencies,
            Direction::Downstream => &self.dependents,
        }
    }
}

type Entries<T> = IndexMap<NodeId, Entry<T>>;

/// Mutable state of a connected set of nodes.
///
/// Once merged into another registry, `entries` is empty and `merged_into`
/// points at the survivor.
struct Registry<T> {
    entries: RefCell<Entries<T>>,
    merged_into: RefCell<Option<Rc<Registry<T>>>>,
}

impl<T> Registry<T> {
    fn holding(entry: Entry<T>) -> Rc<Self> {
        let mut entries = IndexMap::new();
        entries.insert(entry.identity.id, entry);
        Rc::new(Self {
            entries: RefCell::new(entries),
            merged_into: RefCell::new(None),
        })
    }
}

/// The registry currently holding the entries of `registry`'s nodes.
fn resolve<T>(registry: &Rc<Registry<T>>) -> Rc<Registry<T>> {
    let mut current = Rc::clone(registry);
    loop {
        let next = current.merged_into.borrow().clone();
        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}

/// Merge the registries of `a` and `b`, returning the survivor.
fn merge<T>(a: &Rc<Registry<T>>, b: &Rc<Registry<T>>) -> Rc<Registry<T>> {
    let (a, b) = (resolve(a), resolve(b));
    if Rc::ptr_eq(&a, &b) {
        return a;
    }
    let a_len = a.entries.borrow().len();
    let b_len = b.entries.borrow().len();
    let (survivor, absorbed) = if a_len >= b_len { (a, b) } else { (b, a) };

    let moved = std::mem::take(&mut *absorbed.entries.borrow_mut());
    survivor.entries.borrow_mut().extend(moved);
    *absorbed.merged_into.borrow_mut() = Some(Rc::clone(&survivor));
    survivor
}

// ---------------------------------------------------------------------------
// Node handle
// ---------------------------------------------------------------------------

/// A shared handle to a vertex of one or more dependency graphs.
pub struct Node<T> {
    identity: Rc<Identity<T>>,
    registry: Rc<Registry<T>>,
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            identity: Rc::clone(&self.identity),
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.identity, &other.identity)
    }
}

impl<T> Eq for Node<T> {}

impl<T> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.id.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.identity.id)
            .field("reference", &self.identity.reference)
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.reference.fmt(f)
    }
}

impl<T: Reference> Node<T> {
    /// Create a standalone node with no tags, metadata or relations.
    #[must_use]
    pub fn new(reference: T) -> Self {
        debug!(reference = %reference, "created node");
        let identity = Rc::new(Identity {
            id: NodeId::next(),
            reference,
        });
        let registry = Registry::holding(Entry::new(Rc::clone(&identity)));
        Self { identity, registry }
    }

    /// Get the node's ID.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.identity.id
    }

    /// Get the caller-supplied reference.
    #[must_use]
    pub fn reference(&self) -> &T {
        &self.identity.reference
    }

    pub(crate) fn label(&self) -> String {
        self.identity.reference.to_string()
    }

    #[cfg(test)]
    pub(crate) fn downgrade_identity(&self) -> Weak<Identity<T>> {
        Rc::downgrade(&self.identity)
    }

    fn registry(&self) -> Rc<Registry<T>> {
        resolve(&self.registry)
    }

    fn read<R>(&self, f: impl FnOnce(&Entry<T>) -> R) -> R {
        let registry = self.registry();
        let entries = registry.entries.borrow();
        f(&entries[&self.id()])
    }

    fn write<R>(&self, f: impl FnOnce(&mut Entry<T>) -> R) -> R {
        let registry = self.registry();
        let mut entries = registry.entries.borrow_mut();
        f(&mut entries[&self.id()])
    }

    /// A handle to the node `id` held by `registry`.
    fn sibling(entries: &Entries<T>, registry: &Rc<Registry<T>>, id: NodeId) -> Self {
        Self {
            identity: Rc::clone(&entries[&id].identity),
            registry: Rc::clone(registry),
        }
    }

    fn related(&self, direction: Direction) -> Vec<Self> {
        let registry = self.registry();
        let entries = registry.entries.borrow();
        entries[&self.id()]
            .relations(direction)
            .keys()
            .map(|id| Self::sibling(&entries, &registry, *id))
            .collect()
    }

    fn related_with_attributes(&self, direction: Direction) -> Vec<(Self, Attributes)> {
        let registry = self.registry();
        let entries = registry.entries.borrow();
        entries[&self.id()]
            .relations(direction)
            .iter()
            .map(|(id, attrs)| (Self::sibling(&entries, &registry, *id), attrs.clone()))
            .collect()
    }

    /// Create a copy with the same reference, tags and metadata but a fresh
    /// identity, no relations and no observers.
    #[must_use]
    pub fn detached_copy(&self) -> Self {
        let copy = Self::new(self.identity.reference.clone());
        let (tags, duration, status) =
            self.read(|entry| (entry.tags.clone(), entry.duration, entry.status.clone()));
        copy.write(|entry| {
            entry.tags = tags;
            entry.duration = duration;
            entry.status = status;
        });
        copy
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Register a cache observer. Re-registering the same id replaces the
    /// previous handle.
    pub fn register_observer(&self, id: ObserverId, observer: Weak<dyn CacheObserver>) {
        self.write(|entry| entry.observers.register(id, observer));
    }

    /// Remove an observer registration. Returns `true` if it existed.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.write(|entry| entry.observers.unregister(id))
    }

    /// Whether `id` is registered on this node.
    #[must_use]
    pub fn is_observed_by(&self, id: ObserverId) -> bool {
        self.read(|entry| entry.observers.contains(id))
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.read(|entry| entry.observers.live_count())
    }

    fn notify(&self, change: Change) {
        let observers = self.write(|entry| entry.observers.live());
        observer::notify(observers, change);
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Tags in lexicographic order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.read(|entry| entry.tags.iter().cloned().collect())
    }

    /// Whether the node carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.read(|entry| entry.tags.contains(tag))
    }

    /// Add a tag. Returns `true` if it was not present.
    pub fn add_tag(&self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        let inserted = self.write(|entry| entry.tags.insert(tag.clone()));
        if inserted {
            debug!(node = %self, tag = %tag, "added tag");
            self.notify(Change::Metadata);
        }
        inserted
    }

    /// Remove a tag. Returns `true` if it was present.
    pub fn remove_tag(&self, tag: &str) -> bool {
        let removed = self.write(|entry| entry.tags.remove(tag));
        if removed {
            debug!(node = %self, tag, "removed tag");
            self.notify(Change::Metadata);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Scalar metadata
    // -----------------------------------------------------------------------

    /// Duration used by critical path analysis; `None` counts as zero.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.read(|entry| entry.duration)
    }

    /// Set the duration.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidDuration`] for negative or non-finite
    /// values; the node is left unchanged.
    pub fn set_duration(&self, duration: f64) -> Result<()> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(GraphError::InvalidDuration {
                node: self.label(),
                value: duration,
            });
        }
        self.write(|entry| entry.duration = Some(duration));
        self.notify(Change::Metadata);
        Ok(())
    }

    /// Remove the duration.
    pub fn clear_duration(&self) {
        let previous = self.write(|entry| entry.duration.take());
        if previous.is_some() {
            self.notify(Change::Metadata);
        }
    }

    /// Free-form status.
    #[must_use]
    pub fn status(&self) -> Option<String> {
        self.read(|entry| entry.status.clone())
    }

    /// Set the status.
    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.write(|entry| entry.status = Some(status));
        self.notify(Change::Metadata);
    }

    /// Remove the status.
    pub fn clear_status(&self) {
        let previous = self.write(|entry| entry.status.take());
        if previous.is_some() {
            self.notify(Change::Metadata);
        }
    }

    // -----------------------------------------------------------------------
    // Relations
    // -----------------------------------------------------------------------

    /// Nodes this node depends on, in insertion order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Self> {
        self.related(Direction::Upstream)
    }

    /// Nodes that depend on this node, in insertion order. They stay
    /// reachable from here even when the caller holds no other handle to
    /// them.
    #[must_use]
    pub fn dependents(&self) -> Vec<Self> {
        self.related(Direction::Downstream)
    }

    /// Dependencies together with the attributes of each relation.
    #[must_use]
    pub fn dependencies_with_attributes(&self) -> Vec<(Self, Attributes)> {
        self.related_with_attributes(Direction::Upstream)
    }

    /// Dependents together with the attributes of each relation.
    #[must_use]
    pub fn dependents_with_attributes(&self) -> Vec<(Self, Attributes)> {
        self.related_with_attributes(Direction::Downstream)
    }

    /// Neighbours in `direction`.
    #[must_use]
    pub fn neighbors(&self, direction: Direction) -> Vec<Self> {
        self.related(direction)
    }

    /// Whether this node directly depends on `other`.
    #[must_use]
    pub fn depends_on(&self, other: &Self) -> bool {
        self.read(|entry| entry.dependencies.contains_key(&other.id()))
    }

    /// Whether `other` directly depends on this node.
    #[must_use]
    pub fn is_required_by(&self, other: &Self) -> bool {
        self.read(|entry| entry.dependents.contains_key(&other.id()))
    }

    /// Make this node depend on `dependency` (edge `dependency → self`).
    ///
    /// With `check_cycles` the relation is refused if `self` already reaches
    /// `dependency`. Adding an existing relation replaces its attributes.
    ///
    /// # Errors
    ///
    /// [`GraphError::SelfRelation`] when `dependency` is `self`;
    /// [`GraphError::Cycle`] when checking and the relation would close a loop.
    pub fn add_dependency(
        &self,
        dependency: &Self,
        attributes: Attributes,
        check_cycles: bool,
    ) -> Result<()> {
        link(dependency, self, attributes, check_cycles)
    }

    /// Make `dependent` depend on this node (edge `self → dependent`).
    ///
    /// After this call a handle to either node reaches the other.
    ///
    /// # Errors
    ///
    /// Same as [`Node::add_dependency`].
    pub fn add_dependent(
        &self,
        dependent: &Self,
        attributes: Attributes,
        check_cycles: bool,
    ) -> Result<()> {
        link(self, dependent, attributes, check_cycles)
    }

    /// Remove the relation `dependency → self`, returning its attributes.
    ///
    /// # Errors
    ///
    /// [`GraphError::RelationNotFound`] if there is no such relation.
    pub fn remove_dependency(&self, dependency: &Self) -> Result<Attributes> {
        unlink(dependency, self)
    }

    /// Remove the relation `self → dependent`, returning its attributes.
    ///
    /// # Errors
    ///
    /// [`GraphError::RelationNotFound`] if there is no such relation.
    pub fn remove_dependent(&self, dependent: &Self) -> Result<Attributes> {
        unlink(self, dependent)
    }

    /// Attributes of the relation between this node and `other`, in either
    /// direction.
    ///
    /// # Errors
    ///
    /// [`GraphError::RelationNotFound`] if the nodes are not related.
    pub fn edge_attributes(&self, other: &Self) -> Result<Attributes> {
        self.read(|entry| {
            entry
                .dependents
                .get(&other.id())
                .or_else(|| entry.dependencies.get(&other.id()))
                .cloned()
        })
        .ok_or_else(|| GraphError::RelationNotFound {
            dependency: self.label(),
            dependent: other.label(),
        })
    }

    /// Set one attribute on the relation between this node and `other`,
    /// updating both mirrored entries.
    ///
    /// # Errors
    ///
    /// [`GraphError::RelationNotFound`] if the nodes are not related.
    pub fn set_edge_attribute(&self, other: &Self, key: impl Into<String>, value: Value) -> Result<()> {
        if self == other {
            return Err(GraphError::RelationNotFound {
                dependency: self.label(),
                dependent: other.label(),
            });
        }
        let key = key.into();
        let (from, to) = if self.is_required_by(other) {
            (self, other)
        } else if self.depends_on(other) {
            (other, self)
        } else {
            return Err(GraphError::RelationNotFound {
                dependency: self.label(),
                dependent: other.label(),
            });
        };

        let registry = from.registry();
        {
            let mut entries = registry.entries.borrow_mut();
            if let Some(attrs) = entries[&from.id()].dependents.get_mut(&to.id()) {
                attrs.insert(key.clone(), value.clone());
            }
            if let Some(attrs) = entries[&to.id()].dependencies.get_mut(&from.id()) {
                attrs.insert(key, value);
            }
        }
        from.notify(Change::Structure);
        to.notify(Change::Structure);
        Ok(())
    }

    /// Shortest downstream path from this node to `target`, following every
    /// relation regardless of graph membership.
    ///
    /// The path starts with `self` and ends with `target`; asking for a path
    /// to `self` finds a cycle through it, if any.
    #[must_use]
    pub fn find_path(&self, target: &Self) -> Option<Vec<Self>> {
        shortest_path(self, target, |_| true)
    }
}

// ---------------------------------------------------------------------------
// Relation plumbing shared with `Graph`
// ---------------------------------------------------------------------------

/// Wire `from → to` (to depends on from).
///
/// Validation happens strictly before mutation.
pub(crate) fn link<T: Reference>(
    from: &Node<T>,
    to: &Node<T>,
    attributes: Attributes,
    check_cycles: bool,
) -> Result<()> {
    if from == to {
        return Err(GraphError::SelfRelation { node: from.label() });
    }
    if check_cycles {
        if let Some(cycle) = closing_cycle(from, to, |_| true) {
            return Err(cycle_error(&cycle));
        }
    }
    link_unchecked(from, to, attributes);
    Ok(())
}

/// Wire `from → to` without any validation beyond `from != to`, which the
/// caller guarantees.
pub(crate) fn link_unchecked<T: Reference>(from: &Node<T>, to: &Node<T>, attributes: Attributes) {
    debug_assert!(from != to, "self relation");
    debug!(from = %from, to = %to, ?attributes, "adding relation");

    let registry = merge(&from.registry, &to.registry);
    {
        let mut entries = registry.entries.borrow_mut();
        entries[&from.id()]
            .dependents
            .insert(to.id(), attributes.clone());
        entries[&to.id()].dependencies.insert(from.id(), attributes);
    }

    from.notify(Change::Structure);
    to.notify(Change::Structure);
}

/// Remove `from → to`, returning its attributes.
pub(crate) fn unlink<T: Reference>(from: &Node<T>, to: &Node<T>) -> Result<Attributes> {
    let registry = from.registry();
    let removed = {
        let mut entries = registry.entries.borrow_mut();
        let outgoing = entries[&from.id()].dependents.shift_remove(&to.id());
        // `to` lives in another registry when the nodes were never linked.
        let incoming = entries
            .get_mut(&to.id())
            .and_then(|entry| entry.dependencies.shift_remove(&from.id()));
        incoming.or(outgoing)
    };

    let Some(attributes) = removed else {
        return Err(GraphError::RelationNotFound {
            dependency: from.label(),
            dependent: to.label(),
        });
    };

    debug!(from = %from, to = %to, "removed relation");
    from.notify(Change::Structure);
    to.notify(Change::Structure);
    Ok(attributes)
}

/// If adding `from → to` would close a cycle, return the existing path
/// `to → ... → from` restricted to nodes accepted by `allow`.
pub(crate) fn closing_cycle<T, F>(from: &Node<T>, to: &Node<T>, allow: F) -> Option<Vec<Node<T>>>
where
    T: Reference,
    F: Fn(&Node<T>) -> bool,
{
    let mut path = shortest_path(to, from, allow)?;
    path.insert(0, from.clone());
    Some(path)
}

pub(crate) fn cycle_error<T: Reference>(cycle: &[Node<T>]) -> GraphError {
    let cycle: Vec<String> = cycle.iter().map(Node::label).collect();
    warn!(cycle = %cycle.join(" -> "), "cycle detected");
    GraphError::Cycle { cycle }
}

/// BFS along dependents from `start` to `goal`, visiting only nodes accepted
/// by `allow`. Returns `start → ... → goal` with at least one edge.
pub(crate) fn shortest_path<T, F>(start: &Node<T>, goal: &Node<T>, allow: F) -> Option<Vec<Node<T>>>
where
    T: Reference,
    F: Fn(&Node<T>) -> bool,
{
    let mut queue: VecDeque<Node<T>> = VecDeque::from([start.clone()]);
    let mut visited: HashSet<NodeId> = HashSet::from([start.id()]);
    let mut parent: HashMap<NodeId, Node<T>> = HashMap::new();

    while let Some(current) = queue.pop_front() {
        for next in current.dependents() {
            if !allow(&next) {
                continue;
            }
            if next == *goal {
                let mut path = vec![next, current.clone()];
                let mut cursor = current.id();
                while let Some(previous) = parent.get(&cursor) {
                    path.push(previous.clone());
                    cursor = previous.id();
                }
                path.reverse();
                return Some(path);
            }
            if visited.insert(next.id()) {
                parent.insert(next.id(), current.clone());
                queue.push_back(next);
            }
        }
    }

    None
}
