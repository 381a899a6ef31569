//! Dynamic Values
//!
//! Reactive state is dynamically typed. A [`Value`] is either a primitive, a
//! raw container ([`Target`]), a reactive or read-only view of a container
//! ([`Proxy`]), or a boxed reference ([`Ref`]).
//!
//! # Equality
//!
//! `PartialEq` on `Value` is the engine's change-detection rule: primitives
//! compare by value with `NaN` equal to itself and `+0` equal to `-0`;
//! containers, proxies and refs compare by identity. A write only notifies
//! subscribers when the new value differs under this rule.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::reactive::{Proxy, Ref};
use crate::target::{Container, Target, TargetId};

/// Longest array a proxy will grow to.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Largest valid array index.
pub const MAX_ARRAY_INDEX: usize = MAX_ARRAY_LENGTH - 1;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Target(Target),
    Proxy(Proxy),
    Ref(Ref),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_boxed(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The raw container behind a target or proxy.
    pub fn raw_target(&self) -> Option<&Target> {
        match self {
            Value::Target(t) => Some(t),
            Value::Proxy(p) => Some(p.target()),
            _ => None,
        }
    }

    /// Strip any proxy, returning the raw container.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Proxy(p) => Value::Target(p.target().clone()),
            other => other.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Target(_) | Value::Proxy(_) => "object",
            Value::Ref(_) => "ref",
        }
    }

    /// Coerce to an object property key.
    pub fn to_property_key(&self) -> Arc<str> {
        match self {
            Value::String(s) => s.clone(),
            other => Arc::from(other.to_string()),
        }
    }

    /// Interpret as an array index, if it is one.
    ///
    /// Indices are integers in `0..=MAX_ARRAY_INDEX`, given as numbers or as
    /// canonical decimal strings (`"1"`, not `"01"` or `"+1"`).
    pub fn to_index(&self) -> Option<usize> {
        self.to_array_int()
            .filter(|i| *i <= MAX_ARRAY_INDEX)
    }

    /// Interpret as an array length, if it is one.
    pub fn to_array_length(&self) -> Option<usize> {
        self.to_array_int()
            .filter(|len| *len <= MAX_ARRAY_LENGTH)
    }

    fn to_array_int(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_ARRAY_LENGTH as f64 => {
                Some(*n as usize)
            }
            Value::String(s) => s
                .parse::<usize>()
                .ok()
                .filter(|i| i.to_string() == **s),
            _ => None,
        }
    }

    /// Build a value from JSON. Objects and arrays become fresh raw targets.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::Target(Target::array(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(map) => Value::Target(Target::object_from(
                map.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))),
            )),
        }
    }

    /// Snapshot as JSON. Reads raw storage and performs no tracking.
    ///
    /// Cyclic container graphs are not supported.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Target(t) => container_to_json(t),
            Value::Proxy(p) => container_to_json(p.target()),
            Value::Ref(r) => r.get_untracked().to_json(),
        }
    }
}

fn container_to_json(target: &Target) -> serde_json::Value {
    target.read(|c| match c {
        Container::Object(m) => serde_json::Value::Object(
            m.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
        ),
        Container::Array(items) => {
            serde_json::Value::Array(items.iter().map(Value::to_json).collect())
        }
        Container::Map(m) => serde_json::Value::Array(
            m.iter()
                .map(|(k, v)| serde_json::Value::Array(vec![k.value().to_json(), v.to_json()]))
                .collect(),
        ),
        Container::Set(s) => {
            serde_json::Value::Array(s.iter().map(|k| k.value().to_json()).collect())
        }
    })
}

/// Same-value comparison with `NaN == NaN` and `+0 == -0`.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Target(x), Value::Target(y)) => x.ptr_eq(y),
        (Value::Proxy(x), Value::Proxy(y)) => x.ptr_eq(y),
        (Value::Ref(x), Value::Ref(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 9.0e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

fn fmt_container(target: &Target, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    target.read(|c| match c {
        Container::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                if !item.is_nullish() {
                    write!(f, "{item}")?;
                }
            }
            Ok(())
        }
        Container::Object(_) => f.write_str("[object Object]"),
        Container::Map(_) => f.write_str("[object Map]"),
        Container::Set(_) => f.write_str("[object Set]"),
    })
}

/// String conversion in the usual scripting-language style.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::String(s) => f.write_str(s),
            Value::Target(t) => fmt_container(t, f),
            Value::Proxy(p) => fmt_container(p.target(), f),
            Value::Ref(r) => write!(f, "{}", r.get_untracked()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Target(t) => fmt::Debug::fmt(t, f),
            Value::Proxy(p) => fmt::Debug::fmt(p, f),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Target(t)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Undefined)
    }
}

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

/// A value usable as a map key or set member.
///
/// Hashing and equality follow same-value-zero. Proxies are normalized to
/// their raw target on construction, so a map keyed through a proxy and a map
/// keyed through the raw container agree.
#[derive(Clone)]
pub struct ValueKey(Value);

#[derive(PartialEq, Eq, Hash)]
enum KeyRepr<'a> {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(&'a str),
    Target(TargetId),
    Ref(TargetId),
}

impl ValueKey {
    pub fn new(value: Value) -> Self {
        Self(value.to_raw())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn repr(&self) -> KeyRepr<'_> {
        match &self.0 {
            Value::Undefined => KeyRepr::Undefined,
            Value::Null => KeyRepr::Null,
            Value::Bool(b) => KeyRepr::Bool(*b),
            Value::Number(n) if n.is_nan() => KeyRepr::Number(f64::NAN.to_bits()),
            Value::Number(n) if *n == 0.0 => KeyRepr::Number(0),
            Value::Number(n) => KeyRepr::Number(n.to_bits()),
            Value::String(s) => KeyRepr::Str(s),
            Value::Target(t) => KeyRepr::Target(t.id()),
            Value::Proxy(p) => KeyRepr::Target(p.target().id()),
            Value::Ref(r) => KeyRepr::Ref(r.id()),
        }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.repr() == other.repr()
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repr().hash(state);
    }
}

impl fmt::Debug for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
