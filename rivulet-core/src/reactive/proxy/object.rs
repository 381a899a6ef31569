//! Plain objects: string keys in insertion order.

use std::sync::Arc;

use super::{Handler, Trap};
use crate::graph::{TrackKey, TriggerOp};
use crate::target::Container;
use crate::value::Value;

pub(crate) struct ObjectHandler;

fn field(key: &Value) -> Arc<str> {
    key.to_property_key()
}

fn with_fields<R>(trap: &Trap<'_>, f: impl FnOnce(&indexmap::IndexMap<Arc<str>, Value>) -> R) -> R {
    trap.target().read(|c| match c {
        Container::Object(fields) => f(fields),
        _ => unreachable!("object handler over a non-object target"),
    })
}

impl Handler for ObjectHandler {
    fn get(&self, trap: &Trap<'_>, key: &Value) -> Value {
        let name = field(key);
        trap.track(TrackKey::Field(name.clone()));
        let value = with_fields(trap, |fields| fields.get(&name).cloned());
        trap.wrap(value.unwrap_or_default())
    }

    fn has(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let name = field(key);
        trap.track(TrackKey::Field(name.clone()));
        with_fields(trap, |fields| fields.contains_key(&name))
    }

    fn set(&self, trap: &Trap<'_>, key: &Value, value: Value) -> bool {
        let name = field(key);
        let old = trap.target().write(|c| match c {
            Container::Object(fields) => fields.insert(name.clone(), value.clone()),
            _ => unreachable!("object handler over a non-object target"),
        });

        match old {
            None => trap.trigger(Some(TrackKey::Field(name)), TriggerOp::Add),
            Some(old) if old != value => trap.trigger(Some(TrackKey::Field(name)), TriggerOp::Set),
            Some(_) => {}
        }
        true
    }

    fn delete(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let name = field(key);
        let removed = trap.target().write(|c| match c {
            Container::Object(fields) => fields.shift_remove(&name),
            _ => unreachable!("object handler over a non-object target"),
        });

        if removed.is_some() {
            trap.trigger(Some(TrackKey::Field(name)), TriggerOp::Delete);
        }
        removed.is_some()
    }

    fn len(&self, trap: &Trap<'_>) -> usize {
        trap.track(TrackKey::Iterate);
        with_fields(trap, |fields| fields.len())
    }

    fn keys(&self, trap: &Trap<'_>) -> Vec<Value> {
        trap.track(TrackKey::Iterate);
        with_fields(trap, |fields| fields.keys().cloned().map(Value::String).collect())
    }

    fn values(&self, trap: &Trap<'_>) -> Vec<Value> {
        self.entries(trap).into_iter().map(|(_, v)| v).collect()
    }

    fn entries(&self, trap: &Trap<'_>) -> Vec<(Value, Value)> {
        trap.track(TrackKey::Iterate);
        let snapshot: Vec<(Arc<str>, Value)> = with_fields(trap, |fields| {
            fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        });
        snapshot
            .into_iter()
            .map(|(name, value)| {
                trap.track(TrackKey::Field(name.clone()));
                (Value::String(name), trap.wrap(value))
            })
            .collect()
    }
}
