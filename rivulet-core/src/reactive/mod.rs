//! Reactive Primitives
//!
//! This module implements the core reactive system: proxies, refs, computed
//! values and effects, all coordinated by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Proxies
//!
//! A [`Proxy`] wraps a container (object, array, map or set). Reading a key
//! through it within a running subscriber registers that subscriber on the
//! key's cell; writing the key notifies the cell. Read-only proxies track the
//! same way and reject writes.
//!
//! ## Refs
//!
//! A [`Ref`] is a single reactive slot, used for values a proxy cannot wrap.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed and it is read again.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change, either immediately or batched by the scheduler.
//!
//! # Implementation Notes
//!
//! Each runtime keeps its own stack of running subscribers. When a slot is
//! read, the runtime checks whether a subscriber is running and, if so,
//! records the dependency in both directions.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod boxed;
mod computed;
mod context;
mod effect;
mod proxy;
mod runtime;
mod subscriber;

pub use boxed::Ref;
pub use computed::{Computed, ComputedState};
pub use context::{ContextGuard, ReactiveContext};
pub use effect::{Effect, EffectOptions};
pub use proxy::{is_reactive, is_readonly, is_ref, to_raw, unref, Access, Proxy};
pub use runtime::{Runtime, TrackingPause, WeakRuntime};
pub use subscriber::{Scheduling, Subscriber, SubscriberId, SubscriberState};
