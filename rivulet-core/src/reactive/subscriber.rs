//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes effects, computed values, and component render functions.
//!
//! # Lifecycle
//!
//! ```text
//! Inactive --run--> Running <--> Idle --stop--> Stopped
//! ```
//!
//! Every run first detaches the subscriber from all the cells it read last
//! time, then records the cells it reads this time. Branches that are no
//! longer taken stop notifying it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::runtime::{Runtime, WeakRuntime};
use crate::error::{BodyError, ReactiveError, Result};
use crate::graph::{DepCell, DepGraph};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Created lazily and never run.
    Inactive,
    /// Waiting for a dependency to change.
    Idle,
    /// Body is executing.
    Running,
    /// Disposed. Triggers and runs are no-ops.
    Stopped,
}

/// What happens when a dependency of a subscriber changes.
#[derive(Clone, Default)]
pub enum Scheduling {
    /// Re-run immediately, inside the write that triggered it.
    Sync,
    /// Hand the subscriber to the scheduler for the next flush.
    #[default]
    Queued,
    /// Call back instead of re-running.
    Custom(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for Scheduling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduling::Sync => f.write_str("Sync"),
            Scheduling::Queued => f.write_str("Queued"),
            Scheduling::Custom(_) => f.write_str("Custom"),
        }
    }
}

pub(crate) type Body = Box<dyn FnMut() -> std::result::Result<(), BodyError> + Send>;
pub(crate) type StopHook = Box<dyn FnOnce() + Send>;

/// A re-runnable computation and the cells it currently depends on.
pub struct Subscriber {
    id: SubscriberId,
    runtime: WeakRuntime,
    /// Locked for the duration of a run; a failed `try_lock` means re-entry.
    body: Mutex<Body>,
    deps: Mutex<SmallVec<[Arc<DepCell>; 4]>>,
    state: Mutex<SubscriberState>,
    dirty: AtomicBool,
    scheduling: Scheduling,
    run_count: AtomicUsize,
    on_stop: Mutex<Option<StopHook>>,
}

/// Resets the state after a run, including when the body unwinds.
struct RunGuard<'a> {
    subscriber: &'a Subscriber,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.subscriber.state.lock();
        if *state == SubscriberState::Running {
            *state = SubscriberState::Idle;
        }
    }
}

impl Subscriber {
    pub(crate) fn new(
        runtime: &Runtime,
        body: Body,
        scheduling: Scheduling,
        on_stop: Option<StopHook>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            runtime: runtime.downgrade(),
            body: Mutex::new(body),
            deps: Mutex::new(SmallVec::new()),
            state: Mutex::new(SubscriberState::Inactive),
            dirty: AtomicBool::new(false),
            scheduling,
            run_count: AtomicUsize::new(0),
            on_stop: Mutex::new(on_stop),
        })
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn state(&self) -> SubscriberState {
        *self.state.lock()
    }

    /// Not yet stopped.
    pub fn is_active(&self) -> bool {
        self.state() != SubscriberState::Stopped
    }

    /// A dependency changed since the last run.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    /// Number of cells this subscriber is registered in.
    pub fn dependency_count(&self) -> usize {
        self.deps.lock().len()
    }

    pub fn scheduling(&self) -> &Scheduling {
        &self.scheduling
    }

    /// The runtime this subscriber belongs to, while it is alive.
    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade()
    }

    pub(crate) fn is_custom(&self) -> bool {
        matches!(self.scheduling, Scheduling::Custom(_))
    }

    /// Record a cell read during the current run.
    pub(crate) fn add_dependency(&self, cell: Arc<DepCell>) {
        self.deps.lock().push(cell);
    }

    /// Run the body under tracking.
    ///
    /// A stopped subscriber, a subscriber whose runtime is gone, and a
    /// re-entrant run of a subscriber that is already running are no-ops.
    pub(crate) fn run(self: &Arc<Self>) -> Result<()> {
        let Some(runtime) = self.runtime.upgrade() else {
            return Ok(());
        };
        if !self.is_active() {
            return Ok(());
        }
        let Some(mut body) = self.body.try_lock() else {
            tracing::trace!(subscriber = %self.id, "skipping re-entrant run");
            return Ok(());
        };

        self.cleanup(Some(runtime.graph()));
        *self.state.lock() = SubscriberState::Running;
        self.dirty.store(false, Ordering::SeqCst);

        let outcome = {
            let _running = RunGuard { subscriber: self };
            let _ctx = runtime.context().enter(Arc::clone(self));
            let body = &mut *body;
            body()
        };
        self.run_count.fetch_add(1, Ordering::SeqCst);

        outcome.map_err(|source| {
            tracing::error!(subscriber = %self.id, error = %source, "subscriber failed");
            ReactiveError::SubscriberFailed {
                subscriber: self.id,
                source,
            }
        })
    }

    /// React to a change in one of the dependencies.
    pub(crate) fn notify(self: &Arc<Self>, runtime: &Runtime) {
        if !self.is_active() {
            return;
        }
        self.dirty.store(true, Ordering::SeqCst);

        match &self.scheduling {
            Scheduling::Custom(callback) => callback(),
            Scheduling::Queued => runtime.queue_job(Arc::clone(self)),
            Scheduling::Sync => {
                if let Err(err) = self.run() {
                    runtime.scheduler().record_error(err);
                }
            }
        }
    }

    /// Detach from every cell and never run again.
    pub(crate) fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == SubscriberState::Stopped {
                return;
            }
            *state = SubscriberState::Stopped;
        }

        let runtime = self.runtime.upgrade();
        self.cleanup(runtime.as_ref().map(Runtime::graph));
        tracing::trace!(subscriber = %self.id, "subscriber stopped");

        let hook = self.on_stop.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Remove this subscriber from every cell it is registered in.
    fn cleanup(&self, graph: Option<&DepGraph>) {
        let deps = std::mem::take(&mut *self.deps.lock());
        for cell in deps {
            cell.unsubscribe(self.id);
            if let Some(graph) = graph {
                graph.prune(&cell);
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let runtime = self.runtime.upgrade();
        self.cleanup(runtime.as_ref().map(Runtime::graph));
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("scheduling", &self.scheduling)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}
