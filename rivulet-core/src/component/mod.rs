//! Component Layer
//!
//! Just enough of a component model to host render effects and
//! provide/inject: components with a setup function, instances arranged in a
//! tree, a [`ContextScope`] per instance and a string renderer.
//!
//! ```rust,ignore
//! let rt = Runtime::new();
//! let child = Component::new("Child", |cx: &SetupContext<'_>| {
//!     let theme = cx.inject("theme");
//!     move || Node::from(theme.clone())
//! });
//! let parent = Component::new("Parent", move |cx: &SetupContext<'_>| {
//!     cx.provide("theme", "dark");
//!     let child = child.clone();
//!     move || Node::from(&child)
//! });
//!
//! let root = render(&rt, &parent)?;
//! assert_eq!(root.serialize(), "<div>dark</div>");
//! ```

mod instance;
mod renderer;
mod scope;

pub use instance::{ComponentInstance, Phase, SetupContext};
pub use renderer::{render, Component, Node, RenderFn, Root};
pub use scope::{ContextScope, InjectionKey, ScopeId, Symbol};
