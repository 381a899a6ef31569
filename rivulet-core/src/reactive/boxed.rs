//! Boxed References
//!
//! A [`Ref`] is a single-slot reactive cell. It exists for values a proxy
//! cannot wrap, such as numbers and strings, but it may hold anything.
//!
//! # How Refs Work
//!
//! 1. Reading the value within a running subscriber registers that
//!    subscriber on the ref's cell.
//!
//! 2. Writing a different value (by the engine's equality rule) updates the
//!    slot and notifies the cell. Writing an equal value, including `NaN`
//!    over `NaN`, notifies nobody.
//!
//! 3. Containers stored in a ref are made reactive on the way in, so deep
//!    reads and writes through the ref are tracked as well.
//!
//! # Read-only Views
//!
//! [`Ref::as_readonly`] returns a view of the same slot that rejects writes
//! and hands out nested containers read-only. The view and the original
//! share one cell, so subscribers of either see every change.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::proxy::Access;
use super::runtime::Runtime;
use crate::diagnostics::Diagnostic;
use crate::graph::{TrackKey, TriggerOp};
use crate::target::TargetId;
use crate::value::Value;

struct RefSlot {
    /// Identity of the slot in the dependency graph.
    id: TargetId,
    runtime: Runtime,
    value: RwLock<Value>,
}

/// A reactive single-value cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.new_ref(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
#[derive(Clone)]
pub struct Ref {
    slot: Arc<RefSlot>,
    access: Access,
}

impl Ref {
    fn new(runtime: &Runtime, value: Value) -> Self {
        Self {
            slot: Arc::new(RefSlot {
                id: TargetId::new(),
                runtime: runtime.clone(),
                value: RwLock::new(runtime.reactive(value)),
            }),
            access: Access::Mutable,
        }
    }

    /// Get the ref's unique ID.
    pub fn id(&self) -> TargetId {
        self.slot.id
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_readonly(&self) -> bool {
        self.access == Access::Readonly
    }

    /// A read-only view of the same slot.
    pub fn as_readonly(&self) -> Ref {
        Ref {
            slot: Arc::clone(&self.slot),
            access: Access::Readonly,
        }
    }

    /// Whether two handles share a slot, regardless of access.
    pub fn same_slot(&self, other: &Ref) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> Value {
        self.slot.runtime.track(self.slot.id, TrackKey::Value);
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> Value {
        let value = self.slot.value.read().clone();
        match self.access {
            Access::Mutable => value,
            Access::Readonly => self.slot.runtime.readonly(value),
        }
    }

    /// Replace the value.
    ///
    /// Returns `false` if this is a read-only view; the slot is left
    /// unchanged and a diagnostic is recorded.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        if self.is_readonly() {
            self.slot
                .runtime
                .diagnostics()
                .emit(Diagnostic::ReadonlyMutation {
                    op: "Set",
                    key: Some("value".to_string()),
                });
            return false;
        }

        let runtime = &self.slot.runtime;
        let value = runtime.reactive(value.into());
        {
            let mut slot = self.slot.value.write();
            if slot.to_raw() == value.to_raw() {
                return true;
            }
            *slot = value;
        }

        runtime.trigger(self.slot.id, Some(TrackKey::Value), TriggerOp::Set);
        true
    }

    /// Replace the value with `f(current)`. The read is not tracked.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) -> bool {
        let current = self.get_untracked();
        self.set(f(&current))
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.same_slot(other) && self.access == other.access
    }
}

impl Eq for Ref {}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.slot.id)
            .field("access", &self.access)
            .field("value", &*self.slot.value.read())
            .finish()
    }
}

impl Runtime {
    /// A mutable boxed reference. Containers are wrapped reactive.
    pub fn new_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(self, value.into())
    }

    /// A boxed reference that rejects writes.
    pub fn readonly_ref(&self, value: impl Into<Value>) -> Ref {
        self.new_ref(value).as_readonly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::EffectOptions;
    use crate::target::Target;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn watch(rt: &Runtime, boxed: &Ref) -> (crate::reactive::Effect, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = boxed.clone();
        let effect = rt
            .effect_with(
                move || {
                    reader.get();
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                },
                EffectOptions::sync(),
            )
            .unwrap();
        (effect, runs)
    }

    #[test]
    fn ref_get_set() {
        let rt = Runtime::manual();
        let count = rt.new_ref(0);

        assert_eq!(count.get(), Value::from(0));
        assert!(count.set(5));
        assert_eq!(count.get(), Value::from(5));
        count.update(|v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
        assert_eq!(count.get_untracked(), Value::from(6));
    }

    #[test]
    fn ref_notifies_on_change_only() {
        let rt = Runtime::manual();
        let count = rt.new_ref(1);
        let (_effect, runs) = watch(&rt, &count);

        count.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        count.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nan_over_nan_is_not_a_change() {
        let rt = Runtime::manual();
        let value = rt.new_ref(f64::NAN);
        let (_effect, runs) = watch(&rt, &value);

        value.set(f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn containers_are_made_reactive() {
        let rt = Runtime::manual();
        let raw = Target::object_from([("a", 1)]);
        let boxed = rt.new_ref(raw.clone());

        let inner = boxed.get();
        assert!(crate::reactive::is_reactive(&inner));

        // Assigning the raw target back is not a change.
        let (_effect, runs) = watch(&rt, &boxed);
        boxed.set(raw);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn readonly_view_rejects_writes_and_shares_the_slot() {
        let rt = Runtime::manual();
        let count = rt.new_ref(1);
        let view = count.as_readonly();
        let (_effect, runs) = watch(&rt, &view);

        assert!(!view.set(2));
        assert_eq!(view.get_untracked(), Value::from(1));
        assert_eq!(
            rt.diagnostics().count_matching(r#"Set operation on key "value" failed: target is readonly."#),
            1
        );

        count.set(3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(view.get_untracked(), Value::from(3));
        assert_ne!(view, count);
        assert!(view.same_slot(&count));
    }

    #[test]
    fn readonly_ref_contents_are_readonly() {
        let rt = Runtime::manual();
        let state = rt.readonly_ref(Target::object_from([("n", 1)]));

        let inner = state.get();
        assert!(crate::reactive::is_readonly(&inner));
        assert!(!inner.as_proxy().unwrap().set("n", 2));
    }
}
