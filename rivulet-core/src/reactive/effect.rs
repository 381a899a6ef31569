//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazily).
//!
//! 2. When any dependency changes, the effect is re-run according to its
//!    [`Scheduling`]: inside the write, at the next flush, or through a
//!    custom callback.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Ownership
//!
//! Cloning an `Effect` shares it. The effect is stopped when the last
//! handle is dropped, so keep the handle for as long as the effect should
//! stay live.

use std::fmt;
use std::sync::Arc;

use super::runtime::Runtime;
use super::subscriber::{Body, Scheduling, StopHook, Subscriber, SubscriberId, SubscriberState};
use crate::error::Result;

/// Creation options for [`Runtime::effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    pub scheduling: Scheduling,
    /// Called once when the effect is stopped.
    pub on_stop: Option<StopHook>,
}

impl EffectOptions {
    /// Re-run inside the write that triggered the effect.
    pub fn sync() -> Self {
        Self {
            scheduling: Scheduling::Sync,
            ..Self::default()
        }
    }

    /// Re-run at the next scheduler flush.
    pub fn queued() -> Self {
        Self::default()
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_scheduling(mut self, scheduling: Scheduling) -> Self {
        self.scheduling = scheduling;
        self
    }

    pub fn on_stop(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_stop = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduling", &self.scheduling)
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

struct EffectHandle {
    subscriber: Arc<Subscriber>,
}

impl Drop for EffectHandle {
    fn drop(&mut self) {
        self.subscriber.stop();
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.new_ref(0);
///
/// let reader = count.clone();
/// let effect = rt.effect(move || {
///     println!("Count is: {}", reader.get());
/// })?;
///
/// count.set(5);
/// rt.next_tick().await?;  // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
#[must_use = "an effect is stopped when its last handle is dropped"]
pub struct Effect {
    handle: Arc<EffectHandle>,
}

impl Effect {
    /// Build an effect without running it.
    pub(crate) fn create(
        runtime: &Runtime,
        body: Body,
        scheduling: Scheduling,
        on_stop: Option<StopHook>,
    ) -> Self {
        Self {
            handle: Arc::new(EffectHandle {
                subscriber: Subscriber::new(runtime, body, scheduling, on_stop),
            }),
        }
    }

    /// Build an effect and, unless it is lazy, run it once.
    ///
    /// A failing initial run stops the effect and returns the failure.
    pub(crate) fn new(runtime: &Runtime, body: Body, options: EffectOptions) -> Result<Self> {
        let EffectOptions {
            lazy,
            scheduling,
            on_stop,
        } = options;
        let effect = Self::create(runtime, body, scheduling, on_stop);
        if !lazy {
            if let Err(err) = effect.run() {
                effect.stop();
                return Err(err);
            }
        }
        Ok(effect)
    }

    pub(crate) fn subscriber(&self) -> &Arc<Subscriber> {
        &self.handle.subscriber
    }

    pub fn id(&self) -> SubscriberId {
        self.subscriber().id()
    }

    /// Run the body now, re-collecting dependencies.
    pub fn run(&self) -> Result<()> {
        self.subscriber().run()
    }

    /// Queue the effect for the next flush.
    pub fn schedule(&self) {
        let subscriber = self.subscriber();
        if !subscriber.is_active() {
            return;
        }
        if let Some(runtime) = subscriber.runtime() {
            runtime.queue_job(Arc::clone(subscriber));
        }
    }

    /// Dispose of the effect.
    ///
    /// After this the effect depends on nothing and never runs again.
    pub fn stop(&self) {
        self.subscriber().stop();
    }

    pub fn state(&self) -> SubscriberState {
        self.subscriber().state()
    }

    pub fn is_active(&self) -> bool {
        self.subscriber().is_active()
    }

    pub fn is_dirty(&self) -> bool {
        self.subscriber().is_dirty()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.subscriber().run_count()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.subscriber().dependency_count()
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
