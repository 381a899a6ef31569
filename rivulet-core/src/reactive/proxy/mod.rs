//! Reactive Proxies
//!
//! A [`Proxy`] is a tracked view over a raw [`Target`]. Reads through it call
//! [`Runtime::track`]; writes mutate the target and then call
//! [`Runtime::trigger`]. There are two variants:
//!
//! - **Mutable** proxies, from [`Runtime::reactive`].
//! - **Read-only** proxies, from [`Runtime::readonly`]. Reads are tracked the
//!   same way; every mutation is rejected with a
//!   [`Diagnostic::ReadonlyMutation`] and leaves the target untouched.
//!
//! Nested containers are wrapped lazily, on read, with the variant of the
//! proxy they were read through. A container read through a read-only proxy
//! is read-only even if it was stored as a mutable proxy.
//!
//! # Identity
//!
//! Each runtime caches one proxy per `(target, variant)`. Wrapping the same
//! target twice yields the same proxy for as long as any handle to it lives.
//! The cache holds proxies weakly and a dying proxy evicts its own entry.
//!
//! # Shapes
//!
//! Per-shape behavior lives behind the [`Handler`] trait: objects, arrays,
//! maps and sets each get one implementation. Operations a shape does not
//! support log a warning and do nothing.

mod array;
mod collection;
mod object;

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::runtime::Runtime;
use crate::diagnostics::Diagnostic;
use crate::graph::{TrackKey, TriggerOp};
use crate::target::{Shape, Target, TargetId};
use crate::value::Value;

/// Whether a view permits writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Mutable,
    Readonly,
}

/// Per-shape trap implementations.
///
/// Traps run with the target lock released around every call into the
/// runtime, so tracking and triggering never happen under a target lock.
pub(crate) trait Handler: Send + Sync {
    fn get(&self, trap: &Trap<'_>, key: &Value) -> Value {
        trap.unsupported("get");
        let _ = key;
        Value::Undefined
    }

    fn has(&self, trap: &Trap<'_>, key: &Value) -> bool;

    fn set(&self, trap: &Trap<'_>, key: &Value, value: Value) -> bool {
        let _ = (key, value);
        trap.unsupported("set")
    }

    fn delete(&self, trap: &Trap<'_>, key: &Value) -> bool;

    fn clear(&self, trap: &Trap<'_>) -> bool {
        trap.unsupported("clear")
    }

    fn len(&self, trap: &Trap<'_>) -> usize;

    fn keys(&self, trap: &Trap<'_>) -> Vec<Value>;

    fn values(&self, trap: &Trap<'_>) -> Vec<Value>;

    fn entries(&self, trap: &Trap<'_>) -> Vec<(Value, Value)>;

    fn push(&self, trap: &Trap<'_>, value: Value) -> bool {
        let _ = value;
        trap.unsupported("push")
    }

    fn pop(&self, trap: &Trap<'_>) -> Value {
        trap.unsupported("pop");
        Value::Undefined
    }

    fn add(&self, trap: &Trap<'_>, value: Value) -> bool {
        let _ = value;
        trap.unsupported("add")
    }

    fn set_len(&self, trap: &Trap<'_>, len: usize) -> bool {
        let _ = len;
        trap.unsupported("set_len")
    }
}

fn handler_for(shape: Shape) -> &'static dyn Handler {
    match shape {
        Shape::Object => &object::ObjectHandler,
        Shape::Array => &array::ArrayHandler,
        Shape::Map => &collection::MapHandler,
        Shape::Set => &collection::SetHandler,
    }
}

/// Everything a trap needs for one operation.
pub(crate) struct Trap<'a> {
    runtime: &'a Runtime,
    target: &'a Target,
    shape: Shape,
    access: Access,
}

impl Trap<'_> {
    pub(crate) fn target(&self) -> &Target {
        self.target
    }

    pub(crate) fn track(&self, key: TrackKey) {
        self.runtime.track(self.target.id(), key);
    }

    pub(crate) fn trigger(&self, key: Option<TrackKey>, op: TriggerOp) {
        self.runtime
            .trigger_shaped(self.target.id(), Some(self.shape), key, op);
    }

    /// Notify the length cell and every index cell at or past `len`.
    pub(crate) fn trigger_from_index(&self, len: usize) {
        let cells = self.runtime.graph().cells_from_index(self.target.id(), len);
        if !cells.is_empty() {
            self.runtime.notify_cells(cells);
        }
    }

    /// Wrap a value read out of the target with this proxy's variant.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        match self.access {
            Access::Mutable => self.runtime.reactive(value),
            Access::Readonly => self.runtime.readonly(value),
        }
    }

    fn unsupported(&self, op: &'static str) -> bool {
        tracing::warn!(
            target: "rivulet",
            op,
            shape = ?self.shape,
            target_id = %self.target.id(),
            "operation not supported by this target shape"
        );
        false
    }
}

/// Strip a mutable proxy down to its target before storing it.
///
/// Read-only proxies are stored as they are so that reading them back keeps
/// them read-only.
pub(crate) fn to_storable(value: Value) -> Value {
    match value {
        Value::Proxy(proxy) if !proxy.is_readonly() => Value::Target(proxy.target().clone()),
        other => other,
    }
}

struct ProxyInner {
    runtime: Runtime,
    target: Target,
    shape: Shape,
    access: Access,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        self.runtime
            .proxies()
            .evict(self.access, self.target.id());
    }
}

/// Identity caches, one per variant.
#[derive(Default)]
pub(crate) struct ProxyCache {
    reactive: DashMap<TargetId, Weak<ProxyInner>>,
    readonly: DashMap<TargetId, Weak<ProxyInner>>,
}

impl ProxyCache {
    fn map(&self, access: Access) -> &DashMap<TargetId, Weak<ProxyInner>> {
        match access {
            Access::Mutable => &self.reactive,
            Access::Readonly => &self.readonly,
        }
    }

    fn get_or_create(&self, runtime: &Runtime, target: &Target, access: Access) -> Proxy {
        let mut entry = self.map(access).entry(target.id()).or_default();
        if let Some(inner) = entry.upgrade() {
            return Proxy { inner };
        }

        let inner = Arc::new(ProxyInner {
            runtime: runtime.clone(),
            target: target.clone(),
            shape: target.shape(),
            access,
        });
        *entry = Arc::downgrade(&inner);
        Proxy { inner }
    }

    fn evict(&self, access: Access, id: TargetId) {
        self.map(access)
            .remove_if(&id, |_, weak| weak.strong_count() == 0);
    }

    /// Number of live cached proxies.
    pub(crate) fn len(&self) -> usize {
        self.reactive
            .iter()
            .chain(self.readonly.iter())
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }
}

/// A tracked view of a [`Target`].
///
/// Cloning a proxy clones the handle; clones compare equal.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    /// The raw container behind this proxy.
    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    pub fn id(&self) -> TargetId {
        self.inner.target.id()
    }

    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    pub fn access(&self) -> Access {
        self.inner.access
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.access == Access::Readonly
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Whether two handles are the same proxy.
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn trap(&self) -> Trap<'_> {
        Trap {
            runtime: &self.inner.runtime,
            target: &self.inner.target,
            shape: self.inner.shape,
            access: self.inner.access,
        }
    }

    fn handler(&self) -> &'static dyn Handler {
        handler_for(self.inner.shape)
    }

    /// Report a rejected write. Always returns `false`.
    fn reject(&self, op: &'static str, key: Option<&Value>) -> bool {
        self.inner
            .runtime
            .diagnostics()
            .emit(Diagnostic::ReadonlyMutation {
                op,
                key: key.map(ToString::to_string),
            });
        false
    }

    /// Read a property, element or map entry.
    ///
    /// Containers come back wrapped with this proxy's variant. Arrays also
    /// answer the `"length"` key.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        self.handler().get(&self.trap(), &key.into())
    }

    /// Whether a key or set member is present.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        self.handler().has(&self.trap(), &key.into())
    }

    /// Write a property, element or map entry.
    ///
    /// Writing a value equal to the current one (same-value, `NaN` equal to
    /// itself) notifies nobody. Returns `false` if the write was rejected.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            return self.reject("Set", Some(&key));
        }
        self.handler().set(&self.trap(), &key, to_storable(value.into()))
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            return self.reject("Delete", Some(&key));
        }
        self.handler().delete(&self.trap(), &key)
    }

    /// Remove every entry of a map, set or array.
    pub fn clear(&self) -> bool {
        if self.is_readonly() {
            return self.reject("Clear", None);
        }
        self.handler().clear(&self.trap())
    }

    /// Number of entries. Tracks iteration.
    pub fn len(&self) -> usize {
        self.handler().len(&self.trap())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Value> {
        self.handler().keys(&self.trap())
    }

    pub fn values(&self) -> Vec<Value> {
        self.handler().values(&self.trap())
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.handler().entries(&self.trap())
    }

    /// Append to an array.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.is_readonly() {
            let index = Value::from(self.target().len());
            return self.reject("Add", Some(&index));
        }
        self.handler().push(&self.trap(), to_storable(value))
    }

    /// Remove and return the last array element.
    pub fn pop(&self) -> Value {
        if self.is_readonly() {
            let last = self.target().len().saturating_sub(1);
            self.reject("Delete", Some(&Value::from(last)));
            return Value::Undefined;
        }
        self.handler().pop(&self.trap())
    }

    /// Insert a set member. Returns `false` if rejected.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.is_readonly() {
            return self.reject("Add", Some(&value));
        }
        self.handler().add(&self.trap(), to_storable(value))
    }

    /// Resize an array, padding with `undefined`.
    pub fn set_len(&self, len: usize) -> bool {
        if self.is_readonly() {
            return self.reject("Set", Some(&Value::string("length")));
        }
        self.handler().set_len(&self.trap(), len)
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.inner.target.id())
            .field("shape", &self.inner.shape)
            .field("access", &self.inner.access)
            .finish()
    }
}

impl Runtime {
    /// Wrap a container in a mutable proxy.
    ///
    /// Proxies (of either variant), refs, primitives and targets marked raw
    /// are returned unchanged. Wrapping the same target twice returns the
    /// same proxy.
    pub fn reactive(&self, value: impl Into<Value>) -> Value {
        match value.into() {
            Value::Target(target) => match self.reactive_proxy(&target) {
                Some(proxy) => Value::Proxy(proxy),
                None => Value::Target(target),
            },
            other => other,
        }
    }

    /// Wrap a container in a read-only proxy.
    ///
    /// A mutable proxy becomes the read-only proxy of the same target, a ref
    /// becomes its read-only view. Primitives and raw-marked targets are
    /// returned unchanged.
    pub fn readonly(&self, value: impl Into<Value>) -> Value {
        match value.into() {
            Value::Target(target) => match self.readonly_proxy(&target) {
                Some(proxy) => Value::Proxy(proxy),
                None => Value::Target(target),
            },
            Value::Proxy(proxy) if !proxy.is_readonly() => {
                Value::Proxy(self.proxies().get_or_create(self, proxy.target(), Access::Readonly))
            }
            Value::Ref(boxed) => Value::Ref(boxed.as_readonly()),
            other => other,
        }
    }

    /// The mutable proxy for `target`, unless it is marked raw.
    pub fn reactive_proxy(&self, target: &Target) -> Option<Proxy> {
        (!target.is_marked_raw()).then(|| self.proxies().get_or_create(self, target, Access::Mutable))
    }

    /// The read-only proxy for `target`, unless it is marked raw.
    pub fn readonly_proxy(&self, target: &Target) -> Option<Proxy> {
        (!target.is_marked_raw()).then(|| self.proxies().get_or_create(self, target, Access::Readonly))
    }

    /// Number of live proxies this runtime has handed out.
    pub fn proxy_count(&self) -> usize {
        self.proxies().len()
    }
}

/// A mutable proxy.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Proxy(p) if !p.is_readonly())
}

/// A read-only proxy or a read-only ref.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The raw container behind a proxy; anything else unchanged.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

/// The current value of a ref (tracked); anything else unchanged.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::EffectOptions;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn wrapping_is_identity_stable() {
        let rt = Runtime::manual();
        let raw = Target::object();

        let a = rt.reactive(raw.clone());
        let b = rt.reactive(raw.clone());
        assert_eq!(a, b);
        assert_eq!(rt.reactive(a.clone()), a);
        assert_eq!(rt.proxy_count(), 1);
    }

    #[test]
    fn readonly_cannot_be_escalated() {
        let rt = Runtime::manual();
        let raw = Target::object();

        let ro = rt.readonly(raw.clone());
        assert_eq!(rt.reactive(ro.clone()), ro);
        assert!(is_readonly(&ro));
        assert!(!is_reactive(&ro));

        let rw = rt.reactive(raw);
        assert!(is_reactive(&rw));
        assert_eq!(rt.readonly(rw), ro);
    }

    #[test]
    fn primitives_and_raw_targets_pass_through() {
        let rt = Runtime::manual();
        assert_eq!(rt.reactive(1), Value::from(1));
        assert_eq!(rt.readonly("a"), Value::from("a"));

        let skipped = Target::object().mark_raw();
        assert_eq!(rt.reactive(skipped.clone()), Value::Target(skipped.clone()));
        assert!(rt.readonly_proxy(&skipped).is_none());
    }

    #[test]
    fn cache_entry_dies_with_proxy() {
        let rt = Runtime::manual();
        let raw = Target::object();

        let proxy = rt.reactive_proxy(&raw).unwrap();
        assert_eq!(rt.proxy_count(), 1);
        drop(proxy);
        assert_eq!(rt.proxy_count(), 0);
    }

    #[test]
    fn readonly_writes_are_rejected() {
        let rt = Runtime::manual();
        let raw = Target::object_from([("count", 1)]);
        let ro = rt.readonly_proxy(&raw).unwrap();

        assert!(!ro.set("count", 2));
        assert!(!ro.delete("count"));
        assert_eq!(ro.get("count"), Value::from(1));
        assert_eq!(
            rt.diagnostics().count_matching(r#"Set operation on key "count" failed: target is readonly."#),
            1
        );
        assert_eq!(rt.diagnostics().len(), 2);
    }

    #[test]
    fn mutable_proxies_are_stored_raw() {
        let rt = Runtime::manual();
        let outer = rt.reactive_proxy(&Target::object()).unwrap();
        let inner = rt.reactive(Target::object());

        outer.set("child", inner.clone());
        let stored = outer.target().read(|c| match c {
            crate::target::Container::Object(m) => m.get("child").cloned(),
            _ => None,
        });
        assert!(matches!(stored, Some(Value::Target(_))));
        assert_eq!(outer.get("child"), inner);
    }

    #[test]
    fn readonly_proxies_track_reads() {
        let rt = Runtime::manual();
        let raw = Target::object_from([("count", 1)]);
        let rw = rt.reactive_proxy(&raw).unwrap();
        let ro = rt.readonly_proxy(&raw).unwrap();
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let _effect = rt
            .effect_with(
                move || {
                    ro.get("count");
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                },
                EffectOptions::sync(),
            )
            .unwrap();

        rw.set("count", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unref_reads_refs() {
        let rt = Runtime::manual();
        let boxed = rt.new_ref(3);
        assert!(is_ref(&Value::Ref(boxed.clone())));
        assert_eq!(unref(&Value::Ref(boxed)), Value::from(3));
        assert_eq!(unref(&Value::from(4)), Value::from(4));

        let proxy = rt.reactive(Target::array([1]));
        assert!(matches!(to_raw(&proxy), Value::Target(_)));
    }
}
