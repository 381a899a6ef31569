//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive state to
//! the effects and computed values reading it. It owns the dependency graph,
//! the tracking stack and the scheduler, and routes changes between them.
//!
//! # How It Works
//!
//! 1. When a subscriber runs, the runtime makes it the current subscriber
//!    on its tracking stack.
//!
//! 2. When a proxy, ref or computed value is read, it calls [`Runtime::track`]
//!    and the runtime links the current subscriber to the slot's cell.
//!
//! 3. When a slot is written, it calls [`Runtime::trigger`]. The runtime:
//!    a. Collects the affected cells from the graph
//!    b. Notifies computed values first, so they are dirty before anything
//!       that reads them re-runs
//!    c. Queues effects on the scheduler, or runs sync effects in place
//!
//! # Handles
//!
//! `Runtime` is a cheap, cloneable handle. Nothing is process-global: two
//! runtimes never see each other's dependencies. Subscribers keep a weak
//! handle, so a runtime is torn down when the last strong handle goes away.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use tokio::runtime::{Handle, RuntimeFlavor};

use super::context::ReactiveContext;
use super::effect::{Effect, EffectOptions};
use super::proxy::ProxyCache;
use super::subscriber::Subscriber;
use crate::config::{FlushMode, RuntimeConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{IntoRunResult, Result};
use crate::graph::{DepCell, DepGraph, Scheduler, TrackKey, TriggerOp};
use crate::target::{Shape, TargetId};

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    graph: DepGraph,
    context: ReactiveContext,
    scheduler: Scheduler,
    diagnostics: Diagnostics,
    proxies: ProxyCache,
}

/// Handle to a reactive runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Non-owning handle to a runtime.
#[derive(Clone)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakRuntime")
    }
}

/// Guard returned by [`Runtime::pause_tracking`]. Tracking resumes on drop.
pub struct TrackingPause<'a> {
    context: &'a ReactiveContext,
    frame: usize,
}

impl Drop for TrackingPause<'_> {
    fn drop(&mut self) {
        self.context.resume(self.frame);
    }
}

impl Runtime {
    /// A runtime with the default configuration.
    pub fn new() -> Self {
        Self::from_config(RuntimeConfig::default())
    }

    /// A runtime with a validated configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// A runtime that only flushes through [`flush`](Self::flush) and
    /// [`next_tick`](Self::next_tick).
    pub fn manual() -> Self {
        Self::from_config(RuntimeConfig::manual())
    }

    fn from_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                graph: DepGraph::new(),
                context: ReactiveContext::new(),
                scheduler: Scheduler::new(),
                diagnostics: Diagnostics::new(),
                proxies: ProxyCache::default(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn graph(&self) -> &DepGraph {
        &self.inner.graph
    }

    pub fn context(&self) -> &ReactiveContext {
        &self.inner.context
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub(crate) fn proxies(&self) -> &ProxyCache {
        &self.inner.proxies
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Record that the current subscriber read `(target, key)`.
    ///
    /// No-op outside a subscriber run or while tracking is paused.
    pub fn track(&self, target: TargetId, key: TrackKey) {
        let Some(subscriber) = self.inner.context.tracking_subscriber() else {
            return;
        };
        if !subscriber.is_active() {
            return;
        }
        let cell = self.inner.graph.cell(target, key);
        if cell.subscribe(&subscriber) {
            subscriber.add_dependency(cell);
        }
    }

    /// Notify the subscribers of `(target, key)`.
    ///
    /// `key` may be `None` for changes with no single key, such as a clear.
    /// Structural changes also notify subscribers that iterated the target.
    pub fn trigger(&self, target: TargetId, key: Option<TrackKey>, op: TriggerOp) {
        self.trigger_shaped(target, None, key, op);
    }

    /// [`trigger`](Self::trigger) with the container shape known, which
    /// selects the right iteration cells.
    pub(crate) fn trigger_shaped(
        &self,
        target: TargetId,
        shape: Option<Shape>,
        key: Option<TrackKey>,
        op: TriggerOp,
    ) {
        let cells = self.inner.graph.cells_for(target, shape, op, key.as_ref());
        if cells.is_empty() {
            return;
        }
        tracing::trace!(%target, key = ?key, ?op, cells = cells.len(), "trigger");
        self.notify_cells(cells);
    }

    /// Notify every live subscriber of `cells` once.
    ///
    /// The subscriber currently running is skipped, so an effect writing a
    /// slot it also reads does not re-queue itself.
    pub(crate) fn notify_cells(&self, cells: Vec<Arc<DepCell>>) {
        let current = self.inner.context.current_subscriber();
        let mut seen = HashSet::new();
        let mut computed = Vec::new();
        let mut others = Vec::new();

        for cell in &cells {
            for subscriber in cell.live_subscribers() {
                if Some(subscriber.id()) == current || !seen.insert(subscriber.id()) {
                    continue;
                }
                if subscriber.is_custom() {
                    computed.push(subscriber);
                } else {
                    others.push(subscriber);
                }
            }
        }
        drop(cells);

        for subscriber in computed.into_iter().chain(others) {
            subscriber.notify(self);
        }
    }

    /// Run `f` without attributing its reads to the current subscriber.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _pause = self.pause_tracking();
        f()
    }

    /// Pause tracking until the returned guard is dropped. Pauses nest.
    pub fn pause_tracking(&self) -> TrackingPause<'_> {
        TrackingPause {
            context: &self.inner.context,
            frame: self.inner.context.pause(),
        }
    }

    /// Whether reads are currently being tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_active()
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Create an effect and run it immediately.
    ///
    /// Re-runs are batched by the scheduler. The body may return `()` or a
    /// `Result<(), E>`; a failing first run is returned here.
    pub fn effect<F, R>(&self, f: F) -> Result<Effect>
    where
        F: FnMut() -> R + Send + 'static,
        R: IntoRunResult,
    {
        self.effect_with(f, EffectOptions::default())
    }

    /// Create an effect with explicit options.
    pub fn effect_with<F, R>(&self, mut f: F, options: EffectOptions) -> Result<Effect>
    where
        F: FnMut() -> R + Send + 'static,
        R: IntoRunResult,
    {
        Effect::new(self, Box::new(move || f().into_run_result()), options)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Hand a subscriber to the scheduler, spawning a flush if needed.
    ///
    /// Flushes are only spawned on a current-thread runtime, where the task
    /// cannot start before the writing code yields. Elsewhere the flush stays
    /// pending until `flush` or `next_tick`.
    pub(crate) fn queue_job(&self, job: Arc<Subscriber>) {
        if !self.inner.scheduler.queue_job(job) {
            return;
        }
        if self.inner.config.flush_mode != FlushMode::Spawn {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        if handle.runtime_flavor() != RuntimeFlavor::CurrentThread {
            tracing::trace!("not a current-thread runtime, flush left pending");
            return;
        }
        let runtime = self.clone();
        handle.spawn(async move {
            if let Err(err) = runtime.flush() {
                runtime.scheduler().record_error(err);
            }
        });
    }

    /// Drain the scheduler queue now.
    ///
    /// Returns the first failure since the previous flush. Calling this from
    /// inside a job of a running flush is a no-op.
    pub fn flush(&self) -> Result<()> {
        self.inner.scheduler.flush(self.inner.config.max_recursion)
    }

    /// Wait until pending work has been flushed.
    ///
    /// If another task is mid-flush this waits for that flush to finish;
    /// otherwise it flushes whatever is queued. Either way it then yields
    /// once to the executor.
    pub async fn next_tick(&self) -> Result<()> {
        let outcome = match self.inner.scheduler.flush_in_progress() {
            Some(generation) => {
                let mut completions = self.inner.scheduler.completions();
                let _ = completions.wait_for(|done| *done > generation).await;
                self.inner.scheduler.take_error()
            }
            None => self.flush(),
        };
        tokio::task::yield_now().await;
        outcome
    }

    /// Whether a flush has been requested and has not started.
    pub fn has_pending_flush(&self) -> bool {
        self.inner.scheduler.is_pending()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("graph", &self.inner.graph)
            .field("scheduler", &self.inner.scheduler)
            .field("diagnostics", &self.inner.diagnostics.len())
            .finish()
    }
}
