//! Keyed collections: maps and sets.
//!
//! Entries are tracked per key. Iteration is tracked on the target's
//! iterate cell; map key iteration has its own cell so that value updates,
//! which leave the key set unchanged, do not re-run key-only readers.

use indexmap::{IndexMap, IndexSet};

use super::{Handler, Trap};
use crate::graph::{TrackKey, TriggerOp};
use crate::target::Container;
use crate::value::{Value, ValueKey};

pub(crate) struct MapHandler;

pub(crate) struct SetHandler;

fn read_map<R>(trap: &Trap<'_>, f: impl FnOnce(&IndexMap<ValueKey, Value>) -> R) -> R {
    trap.target().read(|c| match c {
        Container::Map(entries) => f(entries),
        _ => unreachable!("map handler over a non-map target"),
    })
}

fn write_map<R>(trap: &Trap<'_>, f: impl FnOnce(&mut IndexMap<ValueKey, Value>) -> R) -> R {
    trap.target().write(|c| match c {
        Container::Map(entries) => f(entries),
        _ => unreachable!("map handler over a non-map target"),
    })
}

fn read_set<R>(trap: &Trap<'_>, f: impl FnOnce(&IndexSet<ValueKey>) -> R) -> R {
    trap.target().read(|c| match c {
        Container::Set(members) => f(members),
        _ => unreachable!("set handler over a non-set target"),
    })
}

fn write_set<R>(trap: &Trap<'_>, f: impl FnOnce(&mut IndexSet<ValueKey>) -> R) -> R {
    trap.target().write(|c| match c {
        Container::Set(members) => f(members),
        _ => unreachable!("set handler over a non-set target"),
    })
}

impl Handler for MapHandler {
    fn get(&self, trap: &Trap<'_>, key: &Value) -> Value {
        let key = ValueKey::new(key.clone());
        trap.track(TrackKey::Entry(key.clone()));
        let value = read_map(trap, |entries| entries.get(&key).cloned());
        trap.wrap(value.unwrap_or_default())
    }

    fn has(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let key = ValueKey::new(key.clone());
        trap.track(TrackKey::Entry(key.clone()));
        read_map(trap, |entries| entries.contains_key(&key))
    }

    fn set(&self, trap: &Trap<'_>, key: &Value, value: Value) -> bool {
        let key = ValueKey::new(key.clone());
        let old = write_map(trap, |entries| entries.insert(key.clone(), value.clone()));

        match old {
            None => trap.trigger(Some(TrackKey::Entry(key)), TriggerOp::Add),
            Some(old) if old != value => trap.trigger(Some(TrackKey::Entry(key)), TriggerOp::Set),
            Some(_) => {}
        }
        true
    }

    fn delete(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let key = ValueKey::new(key.clone());
        let removed = write_map(trap, |entries| entries.shift_remove(&key)).is_some();
        if removed {
            trap.trigger(Some(TrackKey::Entry(key)), TriggerOp::Delete);
        }
        removed
    }

    fn clear(&self, trap: &Trap<'_>) -> bool {
        let had_entries = write_map(trap, |entries| {
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        });
        if had_entries {
            trap.trigger(None, TriggerOp::Clear);
        }
        true
    }

    fn len(&self, trap: &Trap<'_>) -> usize {
        trap.track(TrackKey::Iterate);
        read_map(trap, |entries| entries.len())
    }

    fn keys(&self, trap: &Trap<'_>) -> Vec<Value> {
        trap.track(TrackKey::KeyIterate);
        let keys: Vec<Value> = read_map(trap, |entries| {
            entries.keys().map(|k| k.value().clone()).collect()
        });
        keys.into_iter().map(|k| trap.wrap(k)).collect()
    }

    fn values(&self, trap: &Trap<'_>) -> Vec<Value> {
        self.entries(trap).into_iter().map(|(_, v)| v).collect()
    }

    fn entries(&self, trap: &Trap<'_>) -> Vec<(Value, Value)> {
        trap.track(TrackKey::Iterate);
        let snapshot: Vec<(Value, Value)> = read_map(trap, |entries| {
            entries
                .iter()
                .map(|(k, v)| (k.value().clone(), v.clone()))
                .collect()
        });
        snapshot
            .into_iter()
            .map(|(k, v)| (trap.wrap(k), trap.wrap(v)))
            .collect()
    }
}

impl Handler for SetHandler {
    fn has(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let key = ValueKey::new(key.clone());
        trap.track(TrackKey::Entry(key.clone()));
        read_set(trap, |members| members.contains(&key))
    }

    fn add(&self, trap: &Trap<'_>, value: Value) -> bool {
        let key = ValueKey::new(value);
        let added = write_set(trap, |members| members.insert(key.clone()));
        if added {
            trap.trigger(Some(TrackKey::Entry(key)), TriggerOp::Add);
        }
        true
    }

    fn delete(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let key = ValueKey::new(key.clone());
        let removed = write_set(trap, |members| members.shift_remove(&key));
        if removed {
            trap.trigger(Some(TrackKey::Entry(key)), TriggerOp::Delete);
        }
        removed
    }

    fn clear(&self, trap: &Trap<'_>) -> bool {
        let had_members = write_set(trap, |members| {
            let had_members = !members.is_empty();
            members.clear();
            had_members
        });
        if had_members {
            trap.trigger(None, TriggerOp::Clear);
        }
        true
    }

    fn len(&self, trap: &Trap<'_>) -> usize {
        trap.track(TrackKey::Iterate);
        read_set(trap, |members| members.len())
    }

    fn keys(&self, trap: &Trap<'_>) -> Vec<Value> {
        self.values(trap)
    }

    fn values(&self, trap: &Trap<'_>) -> Vec<Value> {
        trap.track(TrackKey::Iterate);
        let members: Vec<Value> =
            read_set(trap, |members| members.iter().map(|k| k.value().clone()).collect());
        members.into_iter().map(|v| trap.wrap(v)).collect()
    }

    fn entries(&self, trap: &Trap<'_>) -> Vec<(Value, Value)> {
        self.values(trap)
            .into_iter()
            .map(|v| (v.clone(), v))
            .collect()
    }
}
