//! Job Scheduler
//!
//! The scheduler batches subscriber re-runs. Writes during a synchronous
//! burst queue the affected subscribers; a single flush later runs each of
//! them once.
//!
//! # Algorithm
//!
//! 1. `queue_job` appends a subscriber unless it is already waiting
//!    (deduplication by identity). The first job of a tick asks the caller to
//!    schedule a flush.
//! 2. A flush pops jobs in FIFO order. A job leaves the waiting set before it
//!    runs, so a job re-queued by a later job's run is appended and drained
//!    in the same pass.
//! 3. Stopped subscribers are skipped.
//! 4. Each subscriber may run at most `max_recursion` times per flush; going
//!    past that is reported as an infinite update loop, which aborts the
//!    flush and drops the remaining queue.
//!
//! Completion of every flush bumps a generation counter published on a
//! `tokio::sync::watch` channel, which `next_tick` waits on when another
//! task is mid-flush.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Subscriber, SubscriberId};

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Arc<Subscriber>>,
    waiting: HashSet<SubscriberId>,
    /// A flush has been requested and has not started yet.
    pending: bool,
    flushing: bool,
    generation: u64,
    /// Failures with no caller to return them to yet.
    errors: Vec<ReactiveError>,
}

/// Deduplicating FIFO job queue.
pub struct Scheduler {
    state: Mutex<QueueState>,
    completed: watch::Sender<u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState::default()),
            completed,
        }
    }

    /// Queue a job.
    ///
    /// Returns `true` when this is the first job since the last flush and the
    /// caller should arrange for a flush to happen.
    pub(crate) fn queue_job(&self, job: Arc<Subscriber>) -> bool {
        let mut state = self.state.lock();
        if !state.waiting.insert(job.id()) {
            return false;
        }
        tracing::trace!(subscriber = %job.id(), "job queued");
        state.queue.push_back(job);

        if state.pending || state.flushing {
            false
        } else {
            state.pending = true;
            true
        }
    }

    /// Drain the queue.
    ///
    /// Returns the first error raised since the previous flush: an infinite
    /// loop takes precedence, then failures recorded outside any flush, then
    /// failures of jobs run by this flush. A flush requested while one is
    /// already running returns immediately; the running flush drains the
    /// queue.
    pub(crate) fn flush(&self, max_recursion: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return Ok(());
            }
            state.flushing = true;
            state.pending = false;
        }

        let mut runs: HashMap<SubscriberId, usize> = HashMap::new();
        let mut failures = Vec::new();
        let mut fatal = None;
        let mut executed = 0usize;

        loop {
            let job = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(job) => {
                        state.waiting.remove(&job.id());
                        job
                    }
                    None => break,
                }
            };

            if !job.is_active() {
                tracing::trace!(subscriber = %job.id(), "skipping stopped job");
                continue;
            }

            let count = runs.entry(job.id()).or_insert(0);
            *count += 1;
            if *count > max_recursion {
                tracing::error!(
                    subscriber = %job.id(),
                    limit = max_recursion,
                    "maximum recursive updates exceeded"
                );
                fatal = Some(ReactiveError::InfiniteUpdateLoop {
                    subscriber: job.id(),
                    limit: max_recursion,
                });
                let dropped = {
                    let mut state = self.state.lock();
                    state.waiting.clear();
                    std::mem::take(&mut state.queue)
                };
                drop(dropped);
                break;
            }

            tracing::trace!(subscriber = %job.id(), "running job");
            if let Err(err) = job.run() {
                failures.push(err);
            }
            executed += 1;
        }

        let (generation, recorded) = {
            let mut state = self.state.lock();
            state.flushing = false;
            state.generation += 1;
            (state.generation, std::mem::take(&mut state.errors))
        };
        self.completed.send_replace(generation);
        tracing::debug!(generation, jobs = executed, "flush complete");

        match fatal
            .into_iter()
            .chain(recorded)
            .chain(failures)
            .next()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Keep an error for the next flush or `next_tick` to report.
    pub(crate) fn record_error(&self, err: ReactiveError) {
        self.state.lock().errors.push(err);
    }

    /// Report and clear recorded errors.
    pub(crate) fn take_error(&self) -> Result<()> {
        let errors = std::mem::take(&mut self.state.lock().errors);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Generation of the flush currently running, if any.
    pub(crate) fn flush_in_progress(&self) -> Option<u64> {
        let state = self.state.lock();
        state.flushing.then_some(state.generation)
    }

    /// Receiver for flush completions.
    pub(crate) fn completions(&self) -> watch::Receiver<u64> {
        self.completed.subscribe()
    }

    /// Whether a flush has been requested but has not started.
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    /// Number of jobs waiting to run.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of completed flushes.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Scheduler")
            .field("queued", &state.queue.len())
            .field("pending", &state.pending)
            .field("flushing", &state.flushing)
            .field("generation", &state.generation)
            .finish()
    }
}
