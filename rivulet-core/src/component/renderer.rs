//! A minimal string renderer.
//!
//! Components produce [`Node`] trees; the renderer mounts them into
//! [`ComponentInstance`]s and serializes the result as markup. There are no
//! elements or props: the output is text, empty placeholders and nested
//! components, which is all that provide/inject and render scheduling need.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::instance::{ComponentInstance, SetupContext};
use crate::error::{BodyError, Result};
use crate::reactive::Runtime;
use crate::value::Value;

/// A render function produced by a component's setup.
pub type RenderFn = Box<dyn FnMut() -> std::result::Result<Node, BodyError> + Send>;

type SetupFn = dyn Fn(&SetupContext<'_>) -> RenderFn + Send + Sync;

/// A component definition: a name and a setup function.
///
/// Setup runs once per instance, with tracking paused, and returns the
/// render function the instance re-runs whenever its dependencies change.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    setup: Arc<SetupFn>,
}

impl Component {
    pub fn new<S, R, N>(name: impl Into<Arc<str>>, setup: S) -> Self
    where
        S: Fn(&SetupContext<'_>) -> R + Send + Sync + 'static,
        R: FnMut() -> N + Send + 'static,
        N: Into<Node>,
    {
        Self::fallible(name, move |cx: &SetupContext<'_>| {
            let mut render = setup(cx);
            move || Ok::<N, Infallible>(render())
        })
    }

    /// A component whose render function may fail.
    ///
    /// A failed render leaves the previous output in place and surfaces as a
    /// subscriber failure from the flush, or from `render` when mounting.
    pub fn fallible<S, R, N, E>(name: impl Into<Arc<str>>, setup: S) -> Self
    where
        S: Fn(&SetupContext<'_>) -> R + Send + Sync + 'static,
        R: FnMut() -> std::result::Result<N, E> + Send + 'static,
        N: Into<Node>,
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            name: name.into(),
            setup: Arc::new(move |cx: &SetupContext<'_>| -> RenderFn {
                let mut render = setup(cx);
                Box::new(move || {
                    render().map(Into::into).map_err(|err| -> BodyError {
                        let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
                        Arc::from(boxed)
                    })
                })
            }),
        }
    }

    /// A component with no setup state, only a render function.
    pub fn stateless<R, N>(name: impl Into<Arc<str>>, render: R) -> Self
    where
        R: Fn() -> N + Send + Sync + 'static,
        N: Into<Node>,
    {
        let render = Arc::new(render);
        Self::new(name, move |_: &SetupContext<'_>| {
            let render = Arc::clone(&render);
            move || render()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether two handles are the same definition.
    pub fn same_type(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.setup, &other.setup)
    }

    pub(crate) fn setup(&self, cx: &SetupContext<'_>) -> RenderFn {
        (self.setup)(cx)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

/// Output of a render function.
#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    /// Renders as a comment placeholder.
    Empty,
    Component(Component),
    Fragment(Vec<Node>),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    /// Flatten fragments into `out`.
    pub(crate) fn flatten_into(self, out: &mut Vec<Node>) {
        match self {
            Node::Fragment(children) => {
                for child in children {
                    child.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }
}

/// `undefined` and `null` render nothing; refs render their (tracked)
/// value; everything else renders its display string.
impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Undefined | Value::Null => Node::Empty,
            Value::Ref(boxed) => Node::from(boxed.get()),
            other => Node::Text(other.to_string()),
        }
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text)
    }
}

impl From<Component> for Node {
    fn from(component: Component) -> Self {
        Node::Component(component)
    }
}

impl From<&Component> for Node {
    fn from(component: &Component) -> Self {
        Node::Component(component.clone())
    }
}

impl From<Vec<Node>> for Node {
    fn from(children: Vec<Node>) -> Self {
        Node::Fragment(children)
    }
}

/// A mounted component tree.
pub struct Root {
    instance: Arc<ComponentInstance>,
}

impl Root {
    pub fn instance(&self) -> &Arc<ComponentInstance> {
        &self.instance
    }

    /// The tree as markup, wrapped in a `<div>` container.
    pub fn serialize(&self) -> String {
        format!("<div>{}</div>", self.instance.serialize())
    }

    /// Unmount every instance, stopping all of their effects.
    pub fn unmount(&self) {
        self.instance.unmount();
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("component", &self.instance.name())
            .finish()
    }
}

/// Mount `component` as the root of a new tree.
///
/// The initial render happens before this returns; later renders are queued
/// on the runtime's scheduler.
pub fn render(runtime: &Runtime, component: &Component) -> Result<Root> {
    let instance = ComponentInstance::mount(runtime, component.clone(), None)?;
    Ok(Root { instance })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_render_as_text() {
        assert!(matches!(Node::from(Value::Undefined), Node::Empty));
        assert!(matches!(Node::from(Value::Null), Node::Empty));
        assert!(matches!(Node::from(Value::from(2)), Node::Text(t) if t == "2"));
        assert!(matches!(Node::from(Value::from("a")), Node::Text(t) if t == "a"));
    }

    #[test]
    fn fragments_flatten() {
        let mut out = Vec::new();
        Node::Fragment(vec![Node::text("a"), Node::Fragment(vec![Node::Empty, Node::text("b")])])
            .flatten_into(&mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn renders_nested_components() {
        let rt = Runtime::manual();
        let leaf = Component::stateless("Leaf", || "leaf");
        let parent = Component::stateless("Parent", move || {
            vec![Node::text("["), Node::from(&leaf), Node::Empty, Node::text("]")]
        });

        let root = render(&rt, &parent).unwrap();
        assert_eq!(root.serialize(), "<div>[leaf<!---->]</div>");
    }

    #[test]
    fn failed_first_render_is_returned() {
        #[derive(Debug, thiserror::Error)]
        #[error("no data")]
        struct NoData;

        let rt = Runtime::manual();
        let broken = Component::fallible("Broken", |_: &SetupContext<'_>| {
            || Err::<Node, _>(NoData)
        });

        let err = render(&rt, &broken).unwrap_err();
        assert!(matches!(err, crate::error::ReactiveError::SubscriberFailed { .. }));
    }

    #[test]
    fn components_compare_by_definition() {
        let a = Component::stateless("A", || "a");
        let b = Component::stateless("A", || "a");
        assert!(a.same_type(&a.clone()));
        assert!(!a.same_type(&b));
    }
}
