//! Arrays: dense index keys plus a `length` slot.
//!
//! Iteration over an array is tracked through its length cell. Growing the
//! array notifies `length`; shrinking it notifies `length` and every index
//! that fell off the end.

use std::collections::TryReserveError;

use super::{Handler, Trap};
use crate::graph::{TrackKey, TriggerOp};
use crate::target::Container;
use crate::value::{Value, MAX_ARRAY_LENGTH};

pub(crate) struct ArrayHandler;

enum ArrayKey {
    Index(usize),
    Length,
    Other,
}

fn classify(key: &Value) -> ArrayKey {
    if key.as_str() == Some("length") {
        return ArrayKey::Length;
    }
    match key.to_index() {
        Some(i) => ArrayKey::Index(i),
        None => ArrayKey::Other,
    }
}

fn read<R>(trap: &Trap<'_>, f: impl FnOnce(&Vec<Value>) -> R) -> R {
    trap.target().read(|c| match c {
        Container::Array(items) => f(items),
        _ => unreachable!("array handler over a non-array target"),
    })
}

fn write<R>(trap: &Trap<'_>, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    trap.target().write(|c| match c {
        Container::Array(items) => f(items),
        _ => unreachable!("array handler over a non-array target"),
    })
}

/// Grow `items` to `len`, padding with `undefined`.
fn grow(items: &mut Vec<Value>, len: usize) -> Result<(), TryReserveError> {
    items.try_reserve(len.saturating_sub(items.len()))?;
    items.resize(len, Value::Undefined);
    Ok(())
}

fn rejected_length(trap: &Trap<'_>, op: &'static str, len: usize, reason: &dyn std::fmt::Display) -> bool {
    tracing::warn!(
        target: "rivulet",
        op,
        len,
        target_id = %trap.target().id(),
        %reason,
        "array cannot grow to the requested length"
    );
    false
}

impl Handler for ArrayHandler {
    fn get(&self, trap: &Trap<'_>, key: &Value) -> Value {
        match classify(key) {
            ArrayKey::Length => Value::from(self.len(trap)),
            ArrayKey::Index(i) => {
                trap.track(TrackKey::Index(i));
                let value = read(trap, |items| items.get(i).cloned());
                trap.wrap(value.unwrap_or_default())
            }
            ArrayKey::Other => Value::Undefined,
        }
    }

    fn has(&self, trap: &Trap<'_>, key: &Value) -> bool {
        match classify(key) {
            ArrayKey::Length => true,
            ArrayKey::Index(i) => {
                trap.track(TrackKey::Index(i));
                read(trap, |items| i < items.len())
            }
            ArrayKey::Other => false,
        }
    }

    fn set(&self, trap: &Trap<'_>, key: &Value, value: Value) -> bool {
        let i = match classify(key) {
            ArrayKey::Index(i) => i,
            ArrayKey::Length => {
                return match value.to_array_length() {
                    Some(len) => self.set_len(trap, len),
                    None => false,
                };
            }
            ArrayKey::Other => return trap.unsupported("set"),
        };

        let old = write(trap, |items| -> Result<Option<Value>, TryReserveError> {
            if i < items.len() {
                return Ok(Some(std::mem::replace(&mut items[i], value.clone())));
            }
            grow(items, i + 1)?;
            items[i] = value.clone();
            Ok(None)
        });
        let old = match old {
            Ok(old) => old,
            Err(err) => return rejected_length(trap, "set", i + 1, &err),
        };

        match old {
            None => trap.trigger(Some(TrackKey::Index(i)), TriggerOp::Add),
            Some(old) if old != value => trap.trigger(Some(TrackKey::Index(i)), TriggerOp::Set),
            Some(_) => {}
        }
        true
    }

    /// Leaves a hole: the element becomes `undefined`, the length is kept.
    fn delete(&self, trap: &Trap<'_>, key: &Value) -> bool {
        let ArrayKey::Index(i) = classify(key) else {
            return false;
        };
        let old = write(trap, |items| {
            items
                .get_mut(i)
                .map(|slot| std::mem::replace(slot, Value::Undefined))
        });

        match old {
            Some(old) => {
                if !old.is_undefined() {
                    trap.trigger(Some(TrackKey::Index(i)), TriggerOp::Set);
                }
                true
            }
            None => false,
        }
    }

    fn clear(&self, trap: &Trap<'_>) -> bool {
        self.set_len(trap, 0)
    }

    fn len(&self, trap: &Trap<'_>) -> usize {
        trap.track(TrackKey::Length);
        read(trap, |items| items.len())
    }

    fn keys(&self, trap: &Trap<'_>) -> Vec<Value> {
        (0..self.len(trap)).map(Value::from).collect()
    }

    fn values(&self, trap: &Trap<'_>) -> Vec<Value> {
        self.entries(trap).into_iter().map(|(_, v)| v).collect()
    }

    fn entries(&self, trap: &Trap<'_>) -> Vec<(Value, Value)> {
        trap.track(TrackKey::Length);
        let snapshot = read(trap, |items| items.clone());
        snapshot
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                trap.track(TrackKey::Index(i));
                (Value::from(i), trap.wrap(value))
            })
            .collect()
    }

    fn push(&self, trap: &Trap<'_>, value: Value) -> bool {
        let index = write(trap, |items| {
            items.push(value);
            items.len() - 1
        });
        trap.trigger(Some(TrackKey::Index(index)), TriggerOp::Add);
        true
    }

    fn pop(&self, trap: &Trap<'_>) -> Value {
        let popped = write(trap, |items| items.pop().map(|v| (v, items.len())));
        match popped {
            Some((value, new_len)) => {
                trap.trigger_from_index(new_len);
                trap.wrap(value)
            }
            None => Value::Undefined,
        }
    }

    fn set_len(&self, trap: &Trap<'_>, len: usize) -> bool {
        if len > MAX_ARRAY_LENGTH {
            return rejected_length(trap, "set_len", len, &"length out of range");
        }
        let old_len = write(trap, |items| -> Result<usize, TryReserveError> {
            let old_len = items.len();
            if len < old_len {
                items.truncate(len);
            } else {
                grow(items, len)?;
            }
            Ok(old_len)
        });
        let old_len = match old_len {
            Ok(old_len) => old_len,
            Err(err) => return rejected_length(trap, "set_len", len, &err),
        };

        if len < old_len {
            trap.trigger_from_index(len);
        } else if len > old_len {
            trap.trigger(Some(TrackKey::Length), TriggerOp::Set);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::reactive::{EffectOptions, Runtime};
    use crate::target::Target;
    use crate::value::Value;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn count_runs(rt: &Runtime, f: impl Fn() + Send + 'static) -> (crate::reactive::Effect, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let effect = rt
            .effect_with(
                move || {
                    f();
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                },
                EffectOptions::sync(),
            )
            .unwrap();
        (effect, runs)
    }

    #[test]
    fn index_and_length_reads() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array([1, 2, 3])).unwrap();

        assert_eq!(list.get(1), Value::from(2));
        assert_eq!(list.get("length"), Value::from(3));
        assert_eq!(list.get(10), Value::Undefined);
        assert!(list.has(2));
        assert!(!list.has(3));
    }

    #[test]
    fn push_reruns_iteration() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array([1])).unwrap();

        let reader = list.clone();
        let (_effect, runs) = count_runs(&rt, move || {
            reader.values();
        });

        list.push(2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(list.values(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn pop_notifies_removed_index() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array([1, 2])).unwrap();

        let reader = list.clone();
        let (_effect, runs) = count_runs(&rt, move || {
            reader.get(1);
        });

        assert_eq!(list.pop(), Value::from(2));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn truncation_notifies_tail_only() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array([1, 2, 3, 4])).unwrap();

        let head = list.clone();
        let (_head, head_runs) = count_runs(&rt, move || {
            head.get(0);
        });
        let tail = list.clone();
        let (_tail, tail_runs) = count_runs(&rt, move || {
            tail.get(3);
        });

        list.set("length", 2);
        assert_eq!(head_runs.load(Ordering::SeqCst), 1);
        assert_eq!(tail_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writing_past_the_end_pads() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array(Vec::<i32>::new())).unwrap();

        list.set(2, "c");
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0), Value::Undefined);
        assert_eq!(list.get(2), Value::from("c"));
    }

    #[test]
    fn out_of_range_writes_are_rejected() {
        let rt = Runtime::manual();
        let list = rt.reactive_proxy(&Target::array([1])).unwrap();

        let reader = list.clone();
        let (_effect, runs) = count_runs(&rt, move || {
            reader.len();
        });

        assert!(!list.set(Value::from(1.0e19), 2));
        assert!(!list.set(Value::from(crate::value::MAX_ARRAY_LENGTH), 2));
        assert!(!list.set("length", 1.0e19));
        assert!(!list.set_len(usize::MAX));
        assert!(!list.set("01", 2));

        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0), Value::from(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
