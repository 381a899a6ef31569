//! Recoverable diagnostics.
//!
//! Writes through read-only views and injections that resolve to nothing do
//! not abort the caller. They are recorded here and logged at warning level,
//! and the offending operation becomes a no-op or returns `undefined`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A warning-class event raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A mutation was attempted through a read-only proxy or ref.
    ReadonlyMutation {
        /// Operation name, e.g. `Set`, `Delete`, `Add`, `Clear`.
        op: &'static str,
        /// The key involved, if the operation has one.
        key: Option<String>,
    },
    /// `inject` found no provider for a key and no default was given.
    InjectionNotFound { key: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ReadonlyMutation { op, key: Some(key) } => {
                write!(f, "{op} operation on key \"{key}\" failed: target is readonly.")
            }
            Diagnostic::ReadonlyMutation { op, key: None } => {
                write!(f, "{op} operation failed: target is readonly.")
            }
            Diagnostic::InjectionNotFound { key } => write!(f, "injection \"{key}\" not found."),
        }
    }
}

/// Collects diagnostics for a runtime.
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    records: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and log it.
    pub fn emit(&self, diagnostic: Diagnostic) {
        tracing::warn!(target: "rivulet", "{diagnostic}");
        self.records.lock().push(diagnostic);
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    /// Drain recorded diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of recorded diagnostics whose message contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|d| d.to_string().contains(needle))
            .count()
    }
}
