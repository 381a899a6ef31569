//! Rivulet Core
//!
//! This crate provides the reactive state engine behind the Rivulet
//! component runtime. It implements:
//!
//! - Dependency tracking keyed by `(target, key)` pairs
//! - Reactive and read-only proxies over objects, arrays, maps and sets
//! - Boxed refs and cached computed values
//! - Effects with synchronous, queued or custom scheduling
//! - A job scheduler with `flush` and an async `next_tick`
//! - Provide/inject context scopes for component trees
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value` / `target`: the dynamic values and raw containers being observed
//! - `graph`: dependency cells and the job scheduler
//! - `reactive`: the runtime, proxies, refs, computed values and effects
//! - `component`: component instances, context scopes and a string renderer
//! - `config` / `diagnostics` / `error`: runtime settings and reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use rivulet_core::{Runtime, Target};
//!
//! let rt = Runtime::new();
//! let state = rt.reactive(Target::object_from([("count", 0)]));
//! let proxy = state.as_proxy().unwrap().clone();
//!
//! let reader = proxy.clone();
//! let _effect = rt.effect(move || {
//!     println!("count is {}", reader.get("count"));
//! })?;
//!
//! proxy.set("count", 5);
//! rt.next_tick().await?;
//! // prints "count is 5"
//! ```

pub mod component;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod target;
pub mod value;

pub use component::{render, Component, ContextScope, InjectionKey, Node, SetupContext, Symbol};
pub use config::{FlushMode, RuntimeConfig};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{ReactiveError, Result};
pub use reactive::{
    is_reactive, is_readonly, is_ref, to_raw, unref, Computed, Effect, EffectOptions, Proxy, Ref,
    Runtime, Scheduling,
};
pub use target::{Shape, Target, TargetId};
pub use value::Value;
