//! Error types for the reactive engine.
//!
//! Only failures the engine cannot recover from locally are errors. Policy
//! violations such as writes through a read-only view or missing injections
//! are reported as [`Diagnostic`](crate::diagnostics::Diagnostic)s instead.

use std::error::Error as StdError;
use std::sync::Arc;

use crate::reactive::SubscriberId;

/// Error produced by a subscriber body.
pub type BodyError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the reactive engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// A subscriber kept re-queueing itself within a single flush.
    #[error("maximum recursive updates exceeded: subscriber {subscriber} re-ran more than {limit} times in one flush")]
    InfiniteUpdateLoop { subscriber: SubscriberId, limit: usize },

    /// A subscriber body returned an error.
    #[error("subscriber {subscriber} failed: {source}")]
    SubscriberFailed {
        subscriber: SubscriberId,
        #[source]
        source: BodyError,
    },

    /// Runtime configuration could not be parsed or is out of range.
    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Conversion from a subscriber body's return value into a run outcome.
///
/// Implemented for `()` (infallible bodies) and for `Result<(), E>`.
pub trait IntoRunResult {
    fn into_run_result(self) -> std::result::Result<(), BodyError>;
}

impl IntoRunResult for () {
    fn into_run_result(self) -> std::result::Result<(), BodyError> {
        Ok(())
    }
}

impl<E> IntoRunResult for std::result::Result<(), E>
where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
{
    fn into_run_result(self) -> std::result::Result<(), BodyError> {
        self.map_err(|e| Arc::from(e.into()))
    }
}
