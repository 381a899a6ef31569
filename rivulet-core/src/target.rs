//! Raw Containers
//!
//! A [`Target`] is a plain, non-reactive container: an object (string keys),
//! an array, a map (arbitrary keys) or a set. Targets have a stable identity
//! that the dependency graph and the proxy caches key on.
//!
//! Mutating a target directly (through [`Target::write`]) bypasses the
//! reactive system entirely, the same way writing to the raw object behind a
//! proxy would. Go through a [`Proxy`](crate::reactive::Proxy) to have
//! writes notify subscribers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::value::{Value, ValueKey};

/// Identity of a trackable container or cell.
///
/// Raw targets, boxed references and computed values all draw from the same
/// counter so their dependency cells never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The capability set of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Object,
    Array,
    Map,
    Set,
}

/// Storage behind a target.
#[derive(Debug, Clone)]
pub enum Container {
    Object(IndexMap<Arc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<ValueKey, Value>),
    Set(IndexSet<ValueKey>),
}

impl Container {
    pub fn shape(&self) -> Shape {
        match self {
            Container::Object(_) => Shape::Object,
            Container::Array(_) => Shape::Array,
            Container::Map(_) => Shape::Map,
            Container::Set(_) => Shape::Set,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Container::Object(m) => m.len(),
            Container::Array(v) => v.len(),
            Container::Map(m) => m.len(),
            Container::Set(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct TargetCell {
    id: TargetId,
    /// Set by [`Target::mark_raw`]; such targets are never proxied.
    skip: AtomicBool,
    data: RwLock<Container>,
}

/// A shared, identity-bearing container.
///
/// Cloning a `Target` clones the handle, not the data.
#[derive(Clone)]
pub struct Target {
    cell: Arc<TargetCell>,
}

impl Target {
    pub fn new(container: Container) -> Self {
        Self {
            cell: Arc::new(TargetCell {
                id: TargetId::new(),
                skip: AtomicBool::new(false),
                data: RwLock::new(container),
            }),
        }
    }

    /// An empty object.
    pub fn object() -> Self {
        Self::new(Container::Object(IndexMap::new()))
    }

    /// An object populated from key/value pairs.
    pub fn object_from<K, V, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(Container::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::new(Container::Array(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(Container::Map(
            entries
                .into_iter()
                .map(|(k, v)| (ValueKey::new(k.into()), v.into()))
                .collect(),
        ))
    }

    pub fn set<V, I>(members: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::new(Container::Set(
            members
                .into_iter()
                .map(|v| ValueKey::new(v.into()))
                .collect(),
        ))
    }

    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub fn shape(&self) -> Shape {
        self.cell.data.read().shape()
    }

    /// Opt this target out of proxying. Returns a handle to the same target.
    pub fn mark_raw(&self) -> Self {
        self.cell.skip.store(true, Ordering::Relaxed);
        self.clone()
    }

    pub fn is_marked_raw(&self) -> bool {
        self.cell.skip.load(Ordering::Relaxed)
    }

    /// Read the raw storage. Performs no tracking.
    pub fn read<R>(&self, f: impl FnOnce(&Container) -> R) -> R {
        f(&self.cell.data.read())
    }

    /// Mutate the raw storage. Notifies nobody.
    ///
    /// The closure must not change the container's shape.
    pub fn write<R>(&self, f: impl FnOnce(&mut Container) -> R) -> R {
        f(&mut self.cell.data.write())
    }

    pub fn len(&self) -> usize {
        self.read(Container::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles refer to the same container.
    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique() {
        let a = Target::object();
        let b = Target::object();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clones_share_storage() {
        let a = Target::object_from([("count", 1)]);
        let b = a.clone();

        b.write(|c| {
            if let Container::Object(m) = c {
                m.insert("count".into(), Value::from(2));
            }
        });

        let count = a.read(|c| match c {
            Container::Object(m) => m.get("count").cloned(),
            _ => None,
        });
        assert_eq!(count, Some(Value::from(2)));
        assert_eq!(a, b);
    }

    #[test]
    fn shapes() {
        assert_eq!(Target::object().shape(), Shape::Object);
        assert_eq!(Target::array([1, 2]).shape(), Shape::Array);
        assert_eq!(Target::map([("a", 1)]).shape(), Shape::Map);
        assert_eq!(Target::set([1, 1, 2]).len(), 2);
    }

    #[test]
    fn mark_raw_is_sticky() {
        let t = Target::object();
        assert!(!t.is_marked_raw());
        let same = t.mark_raw();
        assert!(t.is_marked_raw());
        assert!(same.ptr_eq(&t));
    }
}
