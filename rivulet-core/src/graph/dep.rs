//! Dependency Cells
//!
//! A [`DepCell`] is one trackable slot: one key on one target. It records
//! which subscribers read that slot during their last run.
//!
//! Cells hold subscribers weakly. A cell never keeps a subscriber alive;
//! the subscriber holds its cells strongly so that it can detach itself from
//! every one of them before each run and when it is disposed.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::{Subscriber, SubscriberId};
use crate::target::TargetId;
use crate::value::ValueKey;

/// The key half of a cell's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A named object property.
    Field(Arc<str>),
    /// An array element.
    Index(usize),
    /// A map entry or set member.
    Entry(ValueKey),
    /// Array length. Also serves as the array iteration key.
    Length,
    /// Iteration over an object, map or set.
    Iterate,
    /// Iteration over map keys only. Unaffected by value updates.
    KeyIterate,
    /// The single slot of a boxed reference or computed value.
    Value,
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Field(name) => f.write_str(name),
            TrackKey::Index(i) => write!(f, "{i}"),
            TrackKey::Entry(key) => write!(f, "{key}"),
            TrackKey::Length => f.write_str("length"),
            TrackKey::Iterate => f.write_str("<iterate>"),
            TrackKey::KeyIterate => f.write_str("<key-iterate>"),
            TrackKey::Value => f.write_str("value"),
        }
    }
}

/// The kind of change a trigger reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// An existing key changed value.
    Set,
    /// A new key appeared.
    Add,
    /// A key was removed.
    Delete,
    /// Every key was removed.
    Clear,
}

impl TriggerOp {
    /// Whether the change alters the container's key set.
    pub fn is_structural(&self) -> bool {
        matches!(self, TriggerOp::Add | TriggerOp::Delete | TriggerOp::Clear)
    }
}

/// One `(target, key)` slot and its subscribers.
pub struct DepCell {
    target: TargetId,
    key: TrackKey,
    subscribers: Mutex<IndexMap<SubscriberId, Weak<Subscriber>>>,
}

impl DepCell {
    pub(crate) fn new(target: TargetId, key: TrackKey) -> Self {
        Self {
            target,
            key,
            subscribers: Mutex::new(IndexMap::new()),
        }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn key(&self) -> &TrackKey {
        &self.key
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub(crate) fn subscribe(&self, subscriber: &Arc<Subscriber>) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers.contains_key(&subscriber.id()) {
            return false;
        }
        subscribers.insert(subscriber.id(), Arc::downgrade(subscriber));
        true
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().shift_remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    /// Live subscribers in subscription order. Dead entries are dropped.
    pub(crate) fn live_subscribers(&self) -> Vec<Arc<Subscriber>> {
        let mut subscribers = self.subscribers.lock();
        let mut live = Vec::with_capacity(subscribers.len());
        subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

impl fmt::Debug for DepCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepCell")
            .field("target", &self.target)
            .field("key", &self.key)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
