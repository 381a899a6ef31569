//! Computed Values
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the getter runs under tracking and the result is
//!    cached.
//!
//! 2. When accessed again, if no dependency has changed, the cached value is
//!    returned.
//!
//! 3. When a dependency changes, the computed value is marked dirty and its
//!    own readers are notified. The getter does not run yet.
//!
//! 4. On next access, the getter re-runs and the cache is refreshed.
//!
//! Computed values that are never read after a change stay dirty and cost
//! nothing.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::effect::Effect;
use super::runtime::Runtime;
use super::subscriber::{Body, Scheduling};
use crate::error::BodyError;
use crate::graph::{TrackKey, TriggerOp};
use crate::target::TargetId;
use crate::value::Value;

/// Dirty state for a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,
    /// A dependency changed, or the getter never ran.
    Dirty,
}

struct ComputedInner {
    /// Identity of the computed value's own cell.
    id: TargetId,
    runtime: Runtime,
    value: Mutex<Value>,
    state: Mutex<ComputedState>,
    effect: Effect,
}

impl ComputedInner {
    /// Called instead of re-running when a dependency changes.
    fn mark_dirty(&self) {
        let was_clean = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ComputedState::Dirty) == ComputedState::Clean
        };
        if was_clean {
            self.runtime
                .trigger(self.id, Some(TrackKey::Value), TriggerOp::Set);
        }
    }
}

/// A lazily evaluated, cached derived value.
///
/// Cloning shares the cache. The getter's dependencies are released when
/// the last clone is dropped or [`stop`](Computed::stop) is called.
#[derive(Clone)]
pub struct Computed {
    inner: Arc<ComputedInner>,
}

impl Computed {
    fn new<F, V>(runtime: &Runtime, mut getter: F) -> Self
    where
        F: FnMut() -> V + Send + 'static,
        V: Into<Value>,
    {
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<ComputedInner>| {
            let store = weak.clone();
            let body: Body = Box::new(move || {
                let value = getter().into();
                if let Some(inner) = store.upgrade() {
                    *inner.value.lock() = value;
                }
                Ok::<(), BodyError>(())
            });

            let dirty = weak.clone();
            let scheduling = Scheduling::Custom(Arc::new(move || {
                if let Some(inner) = dirty.upgrade() {
                    inner.mark_dirty();
                }
            }));

            ComputedInner {
                id: TargetId::new(),
                runtime: runtime.clone(),
                value: Mutex::new(Value::Undefined),
                state: Mutex::new(ComputedState::Dirty),
                effect: Effect::create(runtime, body, scheduling, None),
            }
        });
        Self { inner }
    }

    /// Get the computed value's unique ID.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a running subscriber this also registers a dependency on the
    /// computed value.
    pub fn get(&self) -> Value {
        self.refresh();
        self.inner.runtime.track(self.inner.id, TrackKey::Value);
        self.inner.value.lock().clone()
    }

    /// Get the current value, recomputing if necessary, without tracking.
    pub fn get_untracked(&self) -> Value {
        self.refresh();
        self.inner.value.lock().clone()
    }

    fn refresh(&self) {
        if self.state() == ComputedState::Clean {
            return;
        }
        if let Err(err) = self.inner.effect.run() {
            tracing::error!(computed = %self.inner.id, error = %err, "computed getter failed");
        }
        *self.inner.state.lock() = ComputedState::Clean;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        *self.inner.state.lock()
    }

    /// Release all dependencies. The last value stays readable.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.effect.is_active()
    }

    /// Number of times the getter has run.
    pub fn run_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}

impl Runtime {
    /// Create a computed value. The getter first runs on first read.
    pub fn computed<F, V>(&self, getter: F) -> Computed
    where
        F: FnMut() -> V + Send + 'static,
        V: Into<Value>,
    {
        Computed::new(self, getter)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
