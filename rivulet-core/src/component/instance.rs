//! Component Instances
//!
//! A [`ComponentInstance`] is one mounted occurrence of a
//! [`Component`]. It owns a [`ContextScope`], the effects created during
//! setup, and a render effect that re-runs the component's render function
//! whenever something it read changes.
//!
//! Render effects are queued, so any number of writes before the next flush
//! cause a single re-render. Re-rendering patches children positionally: a
//! child of the same component type is kept (with its state and scope), any
//! other child is unmounted and replaced.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::renderer::{Component, Node};
use super::scope::{ContextScope, InjectionKey};
use crate::error::{BodyError, Result};
use crate::reactive::{Effect, EffectOptions, Runtime};
use crate::value::Value;

/// Lifecycle phase of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Setup or the first render is in progress.
    Setup,
    Mounted,
    Unmounted,
}

enum Slot {
    Text(String),
    Empty,
    Child(Arc<ComponentInstance>),
}

/// A mounted component.
pub struct ComponentInstance {
    uid: u64,
    component: Component,
    runtime: Runtime,
    parent: Option<Weak<ComponentInstance>>,
    scope: Arc<ContextScope>,
    phase: Mutex<Phase>,
    render_effect: Mutex<Option<Effect>>,
    /// Effects created during setup.
    effects: Mutex<Vec<Effect>>,
    rendered: Mutex<Vec<Slot>>,
}

impl ComponentInstance {
    /// Run setup for `component` under `parent` and render it once.
    pub(crate) fn mount(
        runtime: &Runtime,
        component: Component,
        parent: Option<&Arc<ComponentInstance>>,
    ) -> Result<Arc<Self>> {
        static UID: AtomicU64 = AtomicU64::new(0);

        let scope = match parent {
            Some(parent) => ContextScope::child(&parent.scope),
            None => ContextScope::root(runtime),
        };
        let instance = Arc::new(Self {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            component,
            runtime: runtime.clone(),
            parent: parent.map(Arc::downgrade),
            scope,
            phase: Mutex::new(Phase::Setup),
            render_effect: Mutex::new(None),
            effects: Mutex::new(Vec::new()),
            rendered: Mutex::new(Vec::new()),
        });
        tracing::debug!(uid = instance.uid, component = instance.name(), "mounting component");

        let mut render = runtime.untracked(|| {
            let cx = SetupContext {
                instance: &instance,
            };
            instance.component.setup(&cx)
        });

        let weak = Arc::downgrade(&instance);
        let render_effect = runtime.effect_with(
            move || -> std::result::Result<(), BodyError> {
                let Some(instance) = weak.upgrade() else {
                    return Ok(());
                };
                let node = render()?;
                instance.patch(node).map_err(|err| -> BodyError { Arc::new(err) })
            },
            EffectOptions::queued(),
        );
        let render_effect = match render_effect {
            Ok(effect) => effect,
            Err(err) => {
                instance.unmount();
                return Err(err);
            }
        };

        *instance.render_effect.lock() = Some(render_effect);
        *instance.phase.lock() = Phase::Mounted;
        Ok(instance)
    }

    /// Replace the rendered output with `node`.
    ///
    /// If a new child fails to mount, every child of this instance is
    /// unmounted and the output is left empty.
    fn patch(self: &Arc<Self>, node: Node) -> Result<()> {
        let mut flat = Vec::new();
        node.flatten_into(&mut flat);

        let mut previous: VecDeque<Arc<ComponentInstance>> =
            std::mem::take(&mut *self.rendered.lock())
                .into_iter()
                .filter_map(|slot| match slot {
                    Slot::Child(child) => Some(child),
                    _ => None,
                })
                .collect();

        let mut slots = Vec::with_capacity(flat.len());
        let built = self.build_slots(flat, &mut previous, &mut slots);

        for leftover in previous {
            leftover.unmount();
        }
        if let Err(err) = built {
            for slot in &slots {
                if let Slot::Child(child) = slot {
                    child.unmount();
                }
            }
            return Err(err);
        }
        *self.rendered.lock() = slots;
        Ok(())
    }

    /// Turn flattened nodes into slots, reusing `previous` children in order.
    fn build_slots(
        self: &Arc<Self>,
        flat: Vec<Node>,
        previous: &mut VecDeque<Arc<ComponentInstance>>,
        slots: &mut Vec<Slot>,
    ) -> Result<()> {
        for node in flat {
            let slot = match node {
                Node::Text(text) => Slot::Text(text),
                Node::Empty => Slot::Empty,
                Node::Component(component) => match previous.pop_front() {
                    Some(child) if child.component.same_type(&component) => Slot::Child(child),
                    stale => {
                        if let Some(stale) = stale {
                            stale.unmount();
                        }
                        Slot::Child(Self::mount(&self.runtime, component, Some(self))?)
                    }
                },
                // Flattened above.
                Node::Fragment(_) => continue,
            };
            slots.push(slot);
        }
        Ok(())
    }

    /// Stop every effect of this instance and its descendants.
    ///
    /// Calling this more than once has no further effect.
    pub fn unmount(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::Unmounted {
                return;
            }
            *phase = Phase::Unmounted;
        }
        tracing::debug!(uid = self.uid, component = self.name(), "unmounting component");

        if let Some(render_effect) = self.render_effect.lock().take() {
            render_effect.stop();
        }
        let effects = std::mem::take(&mut *self.effects.lock());
        for effect in &effects {
            effect.stop();
        }
        for child in self.children() {
            child.unmount();
        }
    }

    /// The rendered output as markup.
    pub fn serialize(&self) -> String {
        let rendered = self.rendered.lock();
        let mut out = String::new();
        for slot in rendered.iter() {
            match slot {
                Slot::Text(text) => out.push_str(text),
                Slot::Empty => out.push_str("<!---->"),
                Slot::Child(child) => out.push_str(&child.serialize()),
            }
        }
        out
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn scope(&self) -> &Arc<ContextScope> {
        &self.scope
    }

    pub fn parent(&self) -> Option<Arc<ComponentInstance>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Currently rendered child instances, in order.
    pub fn children(&self) -> Vec<Arc<ComponentInstance>> {
        self.rendered
            .lock()
            .iter()
            .filter_map(|slot| match slot {
                Slot::Child(child) => Some(Arc::clone(child)),
                _ => None,
            })
            .collect()
    }

    /// Number of times the render function has run.
    pub fn render_count(&self) -> usize {
        self.render_effect.lock().as_ref().map_or(0, Effect::run_count)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("component", &self.name())
            .field("phase", &self.phase())
            .field("scope", &self.scope.id())
            .finish()
    }
}

/// Handle passed to a component's setup function.
pub struct SetupContext<'a> {
    instance: &'a Arc<ComponentInstance>,
}

impl<'a> SetupContext<'a> {
    pub fn instance(&self) -> &'a Arc<ComponentInstance> {
        self.instance
    }

    pub fn runtime(&self) -> &'a Runtime {
        &self.instance.runtime
    }

    /// Provide `value` to this instance's descendants.
    pub fn provide(&self, key: impl Into<InjectionKey>, value: impl Into<Value>) {
        self.instance.scope.provide(key, value);
    }

    /// Resolve `key` from this instance's ancestors.
    pub fn inject(&self, key: impl Into<InjectionKey>) -> Value {
        self.instance.scope.inject(key)
    }

    pub fn inject_or(&self, key: impl Into<InjectionKey>, default: impl Into<Value>) -> Value {
        self.instance.scope.inject_or(key, default)
    }

    /// Create an effect owned by this instance. It stops on unmount.
    pub fn effect<F, R>(&self, f: F) -> Result<Effect>
    where
        F: FnMut() -> R + Send + 'static,
        R: crate::error::IntoRunResult,
    {
        let effect = self.instance.runtime.effect(f)?;
        self.instance.effects.lock().push(effect.clone());
        Ok(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::render;

    #[test]
    fn rerender_keeps_same_type_children() {
        let rt = Runtime::manual();
        let label = rt.new_ref("a");
        let child = Component::stateless("Child", || "child");

        let source = label.clone();
        let child_def = child.clone();
        let parent = Component::stateless("Parent", move || {
            vec![Node::from(source.get()), Node::from(&child_def)]
        });

        let root = render(&rt, &parent).unwrap();
        let before = root.instance().children();
        assert_eq!(root.serialize(), "<div>achild</div>");

        label.set("b");
        rt.flush().unwrap();
        let after = root.instance().children();
        assert_eq!(root.serialize(), "<div>bchild</div>");
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert_eq!(after[0].render_count(), 1);
    }

    #[test]
    fn swapped_children_are_remounted() {
        let rt = Runtime::manual();
        let show_a = rt.new_ref(true);
        let a = Component::stateless("A", || "a");
        let b = Component::stateless("B", || "b");

        let flag = show_a.clone();
        let parent = Component::stateless("Parent", move || {
            if flag.get() == Value::Bool(true) {
                Node::from(&a)
            } else {
                Node::from(&b)
            }
        });

        let root = render(&rt, &parent).unwrap();
        let first = root.instance().children()[0].clone();

        show_a.set(false);
        rt.flush().unwrap();
        assert_eq!(root.serialize(), "<div>b</div>");
        assert_eq!(first.phase(), Phase::Unmounted);
        assert_eq!(root.instance().children()[0].name(), "B");
    }

    #[test]
    fn unmount_stops_setup_effects() {
        let rt = Runtime::manual();
        let count = rt.new_ref(0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let source = count.clone();
        let sink = seen.clone();
        let comp = Component::new("Watcher", move |cx: &SetupContext<'_>| {
            let source = source.clone();
            let sink = sink.clone();
            cx.effect(move || sink.lock().push(source.get())).unwrap();
            || Node::Empty
        });

        let root = render(&rt, &comp).unwrap();
        count.set(1);
        rt.flush().unwrap();
        root.unmount();
        count.set(2);
        rt.flush().unwrap();

        assert_eq!(*seen.lock(), vec![Value::from(0), Value::from(1)]);
        assert_eq!(root.instance().phase(), Phase::Unmounted);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("child failed to render")]
    struct ChildFailed;

    #[test]
    fn failed_child_mount_unmounts_siblings() {
        let rt = Runtime::manual();
        let broken = rt.new_ref(false);
        let a = Component::stateless("A", || "a");
        let b = Component::stateless("B", || "b");
        let failing = Component::fallible("Failing", |_: &SetupContext<'_>| {
            || Err::<Node, _>(ChildFailed)
        });

        let flag = broken.clone();
        let parent = Component::stateless("Parent", move || {
            if flag.get() == Value::Bool(true) {
                Node::from(&failing)
            } else {
                vec![Node::from(&a), Node::from(&b)].into()
            }
        });

        let root = render(&rt, &parent).unwrap();
        let before = root.instance().children();
        assert_eq!(before.len(), 2);

        broken.set(true);
        let err = rt.flush().unwrap_err();
        assert!(err.to_string().contains("child failed to render"));

        assert!(before.iter().all(|child| child.phase() == Phase::Unmounted));
        assert!(root.instance().children().is_empty());
        assert_eq!(root.serialize(), "<div></div>");
    }

    #[test]
    fn child_scopes_link_to_parent() {
        let rt = Runtime::manual();
        let child = Component::stateless("Child", || Node::Empty);
        let child_def = child.clone();
        let parent = Component::new("Parent", move |cx: &SetupContext<'_>| {
            cx.provide("k", 1);
            let child_def = child_def.clone();
            move || Node::from(&child_def)
        });

        let root = render(&rt, &parent).unwrap();
        let child = root.instance().children()[0].clone();
        assert_eq!(child.scope().inject("k"), Value::from(1));
        assert!(Arc::ptr_eq(&child.parent().unwrap(), root.instance()));
    }
}
