//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently running. This
//! enables automatic dependency tracking: when a reactive slot is read, the
//! current subscriber is registered as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack. Running a subscriber
//! pushes it; the returned guard pops it, even if the body panics. Nested
//! runs (a computed value read from inside an effect, an effect created by
//! another effect) push on top and restore the outer subscriber when done.
//!
//! Tracking can be paused. Pauses are counted per stack frame, so a pause
//! taken by an outer subscriber does not leak into a nested run, and nested
//! pauses resume in order.

use std::sync::Arc;

use parking_lot::Mutex;

use super::subscriber::{Subscriber, SubscriberId};

/// An entry in the reactive context stack.
struct ContextEntry {
    subscriber: Arc<Subscriber>,
    /// Outstanding pauses taken while this entry is on top.
    paused: usize,
}

/// Stack of running subscribers.
#[derive(Default)]
pub struct ReactiveContext {
    stack: Mutex<Vec<ContextEntry>>,
    /// Pauses taken with an empty stack.
    root_paused: Mutex<usize>,
}

/// Guard that pops the context when dropped.
pub struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `subscriber` the current subscriber until the guard drops.
    pub(crate) fn enter(&self, subscriber: Arc<Subscriber>) -> ContextGuard<'_> {
        let subscriber_id = subscriber.id();
        self.stack.lock().push(ContextEntry {
            subscriber,
            paused: 0,
        });
        ContextGuard {
            context: self,
            subscriber_id,
        }
    }

    /// Whether reads are currently being attributed to a subscriber.
    pub fn is_active(&self) -> bool {
        self.stack
            .lock()
            .last()
            .map(|entry| entry.paused == 0)
            .unwrap_or(false)
    }

    /// The running subscriber, regardless of pauses.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.stack.lock().last().map(|entry| entry.subscriber.id())
    }

    /// The subscriber reads should be attributed to, if tracking is live.
    pub(crate) fn tracking_subscriber(&self) -> Option<Arc<Subscriber>> {
        self.stack
            .lock()
            .last()
            .filter(|entry| entry.paused == 0)
            .map(|entry| Arc::clone(&entry.subscriber))
    }

    /// Number of nested running subscribers.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Pause tracking for the current frame. Returns the frame to resume.
    pub(crate) fn pause(&self) -> usize {
        let mut stack = self.stack.lock();
        let frame = stack.len();
        match stack.last_mut() {
            Some(entry) => entry.paused += 1,
            None => *self.root_paused.lock() += 1,
        }
        frame
    }

    /// Undo one [`pause`](Self::pause) taken at `frame`.
    pub(crate) fn resume(&self, frame: usize) {
        if frame == 0 {
            let mut paused = self.root_paused.lock();
            *paused = paused.saturating_sub(1);
            return;
        }
        let mut stack = self.stack.lock();
        if let Some(entry) = stack.get_mut(frame - 1) {
            entry.paused = entry.paused.saturating_sub(1);
        }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.lock().pop();

        // Verify we're popping the right context.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.subscriber.id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                entry.subscriber.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    fn lazy_subscriber(rt: &Runtime) -> Arc<Subscriber> {
        rt.effect_with(|| {}, EffectOptions::default().lazy())
            .unwrap()
            .subscriber()
            .clone()
    }

    #[test]
    fn context_tracks_subscriber() {
        let rt = Runtime::manual();
        let context = ReactiveContext::new();
        let sub = lazy_subscriber(&rt);

        assert!(!context.is_active());
        assert!(context.current_subscriber().is_none());

        {
            let _ctx = context.enter(sub.clone());
            assert!(context.is_active());
            assert_eq!(context.current_subscriber(), Some(sub.id()));
        }

        assert!(!context.is_active());
        assert!(context.current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let rt = Runtime::manual();
        let context = ReactiveContext::new();
        let outer = lazy_subscriber(&rt);
        let inner = lazy_subscriber(&rt);

        {
            let _outer = context.enter(outer.clone());
            {
                let _inner = context.enter(inner.clone());
                assert_eq!(context.current_subscriber(), Some(inner.id()));
                assert_eq!(context.depth(), 2);
            }
            // After inner context drops, outer should be current
            assert_eq!(context.current_subscriber(), Some(outer.id()));
        }

        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn pauses_are_per_frame() {
        let rt = Runtime::manual();
        let context = ReactiveContext::new();
        let outer = lazy_subscriber(&rt);
        let inner = lazy_subscriber(&rt);

        let _outer = context.enter(outer);
        let frame = context.pause();
        assert!(!context.is_active());
        assert!(context.tracking_subscriber().is_none());

        {
            let _inner = context.enter(inner.clone());
            assert!(context.is_active());
            assert_eq!(context.tracking_subscriber().map(|s| s.id()), Some(inner.id()));
        }

        context.resume(frame);
        assert!(context.is_active());
    }

    #[test]
    fn guard_pops_on_panic() {
        let rt = Runtime::manual();
        let context = ReactiveContext::new();
        let sub = lazy_subscriber(&rt);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = context.enter(sub.clone());
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert_eq!(context.depth(), 0);
    }
}
