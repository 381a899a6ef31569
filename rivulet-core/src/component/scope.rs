//! Context Scopes
//!
//! Every component instance owns a [`ContextScope`]: a mapping from
//! [`InjectionKey`] to [`Value`] plus a link to the nearest ancestor's scope.
//! `provide` writes the own mapping; `inject` resolves a key against the own
//! mapping first and then each ancestor in turn, so the nearest provider
//! wins.
//!
//! # Copy on First Provide
//!
//! A new scope starts out sharing its parent's mapping. The first `provide`
//! replaces the shared mapping with a private copy seeded from the parent, so
//! providing in one instance never leaks into its siblings.
//!
//! Injected values are returned as provided. Refs and proxies are not
//! unwrapped, so reads through them are tracked as usual.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::diagnostics::Diagnostic;
use crate::reactive::Runtime;
use crate::value::Value;

/// Unique identifier for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// A unique token usable as an injection key.
///
/// Two symbols are equal only if one is a clone of the other, regardless of
/// their descriptions.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Arc<str>>,
}

impl Symbol {
    pub fn new(description: impl Into<Arc<str>>) -> Self {
        Self::with_description(Some(description.into()))
    }

    pub fn anonymous() -> Self {
        Self::with_description(None)
    }

    fn with_description(description: Option<Arc<str>>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "Symbol({description})"),
            None => f.write_str("Symbol()"),
        }
    }
}

/// Key for `provide`/`inject`: a string or a [`Symbol`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionKey {
    Name(Arc<str>),
    Symbol(Symbol),
}

impl fmt::Display for InjectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionKey::Name(name) => f.write_str(name),
            InjectionKey::Symbol(symbol) => write!(f, "{symbol}"),
        }
    }
}

impl From<&str> for InjectionKey {
    fn from(name: &str) -> Self {
        InjectionKey::Name(name.into())
    }
}

impl From<String> for InjectionKey {
    fn from(name: String) -> Self {
        InjectionKey::Name(name.into())
    }
}

impl From<Symbol> for InjectionKey {
    fn from(symbol: Symbol) -> Self {
        InjectionKey::Symbol(symbol)
    }
}

impl From<&Symbol> for InjectionKey {
    fn from(symbol: &Symbol) -> Self {
        InjectionKey::Symbol(symbol.clone())
    }
}

#[derive(Clone)]
struct ProvideMap {
    /// The scope that created this mapping.
    owner: ScopeId,
    entries: IndexMap<InjectionKey, Value>,
}

/// Per-instance provide/inject storage.
pub struct ContextScope {
    id: ScopeId,
    runtime: Runtime,
    parent: Option<Arc<ContextScope>>,
    provides: RwLock<Arc<ProvideMap>>,
}

impl ContextScope {
    /// A scope with no ancestors.
    pub fn root(runtime: &Runtime) -> Arc<Self> {
        let id = ScopeId::new();
        Arc::new(Self {
            id,
            runtime: runtime.clone(),
            parent: None,
            provides: RwLock::new(Arc::new(ProvideMap {
                owner: id,
                entries: IndexMap::new(),
            })),
        })
    }

    /// A scope under `parent`, sharing its mapping until the first provide.
    pub fn child(parent: &Arc<ContextScope>) -> Arc<Self> {
        Arc::new(Self {
            id: ScopeId::new(),
            runtime: parent.runtime.clone(),
            parent: Some(Arc::clone(parent)),
            provides: RwLock::new(Arc::clone(&parent.provides.read())),
        })
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<ContextScope>> {
        self.parent.as_ref()
    }

    /// Whether this scope has its own mapping yet.
    pub fn has_own_provides(&self) -> bool {
        self.provides.read().owner == self.id
    }

    /// Make `value` available under `key` to this scope and its descendants.
    pub fn provide(&self, key: impl Into<InjectionKey>, value: impl Into<Value>) {
        let key = key.into();
        let mut provides = self.provides.write();
        if provides.owner != self.id {
            let seeded = ProvideMap {
                owner: self.id,
                entries: provides.entries.clone(),
            };
            *provides = Arc::new(seeded);
        }
        tracing::trace!(scope = %self.id, %key, "provide");
        Arc::make_mut(&mut provides).entries.insert(key, value.into());
    }

    /// Resolve `key` against this scope, then each ancestor.
    pub fn lookup(&self, key: &InjectionKey) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.provides.read().entries.get(key) {
                return Some(value.clone());
            }
            scope = current.parent.as_deref();
        }
        None
    }

    /// Resolve `key`, or record an "injection not found" diagnostic and
    /// return `undefined`.
    pub fn inject(&self, key: impl Into<InjectionKey>) -> Value {
        let key = key.into();
        match self.lookup(&key) {
            Some(value) => value,
            None => {
                self.runtime.diagnostics().emit(Diagnostic::InjectionNotFound {
                    key: key.to_string(),
                });
                Value::Undefined
            }
        }
    }

    /// Resolve `key`, falling back to `default` without a diagnostic.
    ///
    /// An explicit `Value::Undefined` default is honored the same way.
    pub fn inject_or(&self, key: impl Into<InjectionKey>, default: impl Into<Value>) -> Value {
        self.lookup(&key.into()).unwrap_or_else(|| default.into())
    }

    /// Resolve `key`, computing the fallback only if nothing is provided.
    pub fn inject_or_else(&self, key: impl Into<InjectionKey>, default: impl FnOnce() -> Value) -> Value {
        self.lookup(&key.into()).unwrap_or_else(default)
    }
}

impl fmt::Debug for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provides = self.provides.read();
        f.debug_struct("ContextScope")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("owner", &provides.owner)
            .field("keys", &provides.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
