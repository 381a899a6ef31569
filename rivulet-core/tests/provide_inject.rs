//! Provide/inject through mounted component trees.

use rivulet_core::component::{render, Component, Node, SetupContext, Symbol};
use rivulet_core::{Runtime, Target, Value};

/// A component whose only child is `child`, providing `entries` first.
fn provider(name: &str, entries: Vec<(&'static str, Value)>, child: &Component) -> Component {
    let child = child.clone();
    Component::new(name, move |cx: &SetupContext<'_>| {
        for (key, value) in &entries {
            cx.provide(*key, value.clone());
        }
        let child = child.clone();
        move || Node::from(&child)
    })
}

/// A component that renders `inject(key)`.
fn consumer(key: &'static str) -> Component {
    Component::new("Consumer", move |cx: &SetupContext<'_>| {
        let injected = cx.inject(key);
        move || Node::from(injected.clone())
    })
}

/// Read `key` from the proxy stored in `state`.
fn field(state: &Value, key: &str) -> Value {
    state
        .as_proxy()
        .map(|proxy| proxy.get(key))
        .unwrap_or_default()
}

#[test]
fn string_keys() {
    let rt = Runtime::manual();
    let middle = Component::stateless("Middle", {
        let consumer = consumer("foo");
        move || Node::from(&consumer)
    });
    let app = provider("Provider", vec![("foo", Value::from(1))], &middle);

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>1</div>");
}

#[test]
fn symbol_keys() {
    let rt = Runtime::manual();
    let key = Symbol::new("foo");

    let consumer = Component::new("Consumer", {
        let key = key.clone();
        move |cx: &SetupContext<'_>| {
            let foo = cx.inject(&key);
            move || Node::from(foo.clone())
        }
    });
    let app = Component::new("Provider", move |cx: &SetupContext<'_>| {
        cx.provide(&key, 2);
        let consumer = consumer.clone();
        move || Node::from(&consumer)
    });

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>2</div>");
}

#[test]
fn default_values() {
    let rt = Runtime::manual();
    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let foo = cx.inject_or("foo", "fooDefault");
        let bar = cx.inject_or("bar", "bar");
        move || Node::text(format!("{foo}{bar}"))
    });
    let app = provider("Provider", vec![("foo", Value::from("foo"))], &consumer);

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>foobar</div>");
    assert!(rt.diagnostics().is_empty());
}

#[test]
fn nested_providers() {
    let rt = Runtime::manual();
    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let foo = cx.inject("foo");
        let bar = cx.inject("bar");
        let baz = cx.inject("baz");
        move || Node::text(format!("{foo},{bar},{baz}"))
    });
    let inner = provider(
        "ProviderTwo",
        vec![("foo", Value::from("fooOverride")), ("baz", Value::from("baz"))],
        &consumer,
    );
    let app = provider(
        "ProviderOne",
        vec![("foo", Value::from("foo")), ("bar", Value::from("bar"))],
        &inner,
    );

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>fooOverride,bar,baz</div>");
}

#[tokio::test]
async fn reactivity_with_refs() {
    let rt = Runtime::new();
    let count = rt.new_ref(1);
    let app = provider("Provider", vec![("count", Value::from(count.clone()))], &consumer("count"));

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>1</div>");

    count.update(|v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
    rt.next_tick().await.unwrap();
    assert_eq!(root.serialize(), "<div>2</div>");
}

#[tokio::test]
async fn reactivity_with_readonly_refs() {
    let rt = Runtime::new();
    let count = rt.new_ref(1);

    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let count = cx.inject("count");
        // Must not take effect.
        if let Some(boxed) = count.as_boxed() {
            boxed.update(|v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0));
        }
        move || Node::from(count.clone())
    });
    let app = provider(
        "Provider",
        vec![("count", Value::from(count.as_readonly()))],
        &consumer,
    );

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>1</div>");
    assert_eq!(
        rt.diagnostics()
            .count_matching(r#"Set operation on key "value" failed: target is readonly"#),
        1
    );

    // Source mutation should still trigger a re-render.
    count.set(2);
    rt.next_tick().await.unwrap();
    assert_eq!(root.serialize(), "<div>2</div>");
}

#[tokio::test]
async fn reactivity_with_objects() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::object_from([("count", 1)]));

    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let state = cx.inject("state");
        move || Node::from(field(&state, "count"))
    });
    let app = provider("Provider", vec![("state", state.clone())], &consumer);

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>1</div>");

    state.as_proxy().unwrap().set("count", 2);
    rt.next_tick().await.unwrap();
    assert_eq!(root.serialize(), "<div>2</div>");
}

#[tokio::test]
async fn reactivity_with_readonly_objects() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::object_from([("count", 1)]));

    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let state = cx.inject("state");
        // Must not take effect.
        if let Some(proxy) = state.as_proxy() {
            let next = proxy.get("count").as_f64().unwrap_or(0.0) + 1.0;
            proxy.set("count", next);
        }
        move || Node::from(field(&state, "count"))
    });
    let app = provider("Provider", vec![("state", rt.readonly(state.clone()))], &consumer);

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>1</div>");
    assert_eq!(
        rt.diagnostics()
            .count_matching(r#"Set operation on key "count" failed: target is readonly"#),
        1
    );

    state.as_proxy().unwrap().set("count", 2);
    rt.next_tick().await.unwrap();
    assert_eq!(root.serialize(), "<div>2</div>");
}

#[test]
fn warns_on_unfound_injection() {
    let rt = Runtime::manual();
    let app = provider("Provider", Vec::new(), &consumer("foo"));

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div><!----></div>");
    assert_eq!(rt.diagnostics().count_matching(r#"injection "foo" not found."#), 1);
}

#[test]
fn undefined_default_does_not_warn() {
    let rt = Runtime::manual();
    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let foo = cx.inject_or("foo", Value::Undefined);
        move || Node::from(foo.clone())
    });
    let app = provider("Provider", Vec::new(), &consumer);

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div><!----></div>");
    assert!(rt.diagnostics().is_empty());
}

#[test]
fn provides_do_not_leak_into_siblings() {
    let rt = Runtime::manual();
    let overriding = provider("Override", vec![("foo", Value::from("override"))], &consumer("foo"));
    let plain = Component::stateless("Plain", {
        let consumer = consumer("foo");
        move || Node::from(&consumer)
    });
    let app = Component::new("App", move |cx: &SetupContext<'_>| {
        cx.provide("foo", "root");
        let overriding = overriding.clone();
        let plain = plain.clone();
        move || vec![Node::from(&overriding), Node::text("|"), Node::from(&plain)]
    });

    let root = render(&rt, &app).unwrap();
    assert_eq!(root.serialize(), "<div>override|root</div>");
}

#[tokio::test]
async fn batched_writes_render_once() {
    let rt = Runtime::new();
    let count = rt.new_ref(1);
    let unrelated = rt.new_ref("a");

    let consumer = Component::new("Consumer", |cx: &SetupContext<'_>| {
        let count = cx.inject("count");
        let unrelated = cx.inject("unrelated");
        move || {
            Node::from(vec![
                Node::from(count.clone()),
                Node::from(unrelated.clone()),
            ])
        }
    });
    let app = provider(
        "Provider",
        vec![
            ("count", Value::from(count.clone())),
            ("unrelated", Value::from(unrelated.clone())),
        ],
        &consumer,
    );

    let root = render(&rt, &app).unwrap();
    let instance = root.instance().children()[0].clone();
    assert_eq!(instance.render_count(), 1);

    count.set(2);
    unrelated.set("b");
    rt.next_tick().await.unwrap();

    assert_eq!(root.serialize(), "<div>2b</div>");
    assert_eq!(instance.render_count(), 2);
    assert_eq!(root.instance().render_count(), 1);
}
