//! The debug render tree mirrors component creation, updates and teardown.

mod common;

use std::rc::Rc;

use common::*;
use serde_json::json;
use stencil_runtime::render_tree::{RecordingRenderTree, RenderTreeEvent};
use stencil_runtime::testing::{ScriptedDefinition, ScriptedManager};
use stencil_runtime::{
    Args, ComponentDefinition, Environment, Expr, Invocation, ProgramBuilder, ResolverRegistry, Value,
};

#[test]
fn render_tree_tracks_component_lifecycle() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = echo_layout(&mut builder, &["name"]);
    let template = layout.handle;
    let mut registry = ResolverRegistry::new();
    let greeter = registry.register_component(
        "greeter",
        ComponentDefinition::new(
            ScriptedManager::<{ CREATE | CREATE_ARGS | UPDATE }>::new(&log),
            ScriptedDefinition::new("Greeter", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(
            greeter,
            Invocation::new(Args::new().named("name", Expr::this().get("name"))),
        );
    });
    let program = builder.build();

    let render_tree = RecordingRenderTree::new();
    let env = Environment::default().with_debug_render_tree(Rc::<RecordingRenderTree>::clone(&render_tree));
    let state = host_state([("name", Value::from("Ada"))]);
    let mut harness = Harness::with_env(env, registry);
    let mut result = harness.render(&program, &root, &state).expect("render succeeds");
    assert_eq!(harness.html(), "Ada");

    let snapshot = serde_json::to_value(render_tree.snapshot()).expect("snapshot serializes");
    assert_eq!(
        snapshot,
        json!([{
            "kind": "component",
            "name": "Greeter",
            "args": [["name", "Ada"]],
            "template": template,
            "bounds": { "parent": 0, "first": 1, "last": 1 },
            "updates": 0,
        }])
    );

    state.set("name", Value::from("Grace"));
    harness.rerender(&program, &mut result);
    let snapshot = render_tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].updates, 1);
    assert_eq!(snapshot[0].args, vec![("name".to_string(), "Grace".to_string())]);

    let events: Vec<&str> = render_tree
        .events()
        .iter()
        .map(|event| match event {
            RenderTreeEvent::Create(_) => "create",
            RenderTreeEvent::Update(_) => "update",
            RenderTreeEvent::DidRender(_) => "did-render",
            RenderTreeEvent::WillDestroy(_) => "will-destroy",
        })
        .collect();
    assert_eq!(events, vec!["create", "did-render", "update", "did-render"]);

    result
        .destroy(&mut harness.env, &mut harness.tree)
        .expect("destroy succeeds");
    assert_eq!(render_tree.live_nodes(), 0);
    assert!(matches!(render_tree.events().last(), Some(RenderTreeEvent::WillDestroy(_))));
}

#[test]
fn render_tree_events_serialize_with_their_bucket() {
    let log = new_log();
    let mut builder = ProgramBuilder::new();
    let layout = echo_layout(&mut builder, &[]);
    let mut registry = ResolverRegistry::new();
    let plain = registry.register_component(
        "plain",
        ComponentDefinition::new(
            ScriptedManager::<CREATE>::new(&log),
            ScriptedDefinition::new("Plain", layout),
        ),
    );
    let root = root_layout(&mut builder, |layout| {
        layout.invoke_static(plain, Invocation::default());
    });
    let program = builder.build();

    let render_tree = RecordingRenderTree::new();
    let env = Environment::default().with_debug_render_tree(Rc::<RecordingRenderTree>::clone(&render_tree));
    let mut harness = Harness::with_env(env, registry);
    harness
        .render(&program, &root, &empty_state())
        .expect("render succeeds");

    let events = serde_json::to_value(render_tree.events()).expect("events serialize");
    let events = events.as_array().expect("events are a list");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "create");
    assert_eq!(events[1]["event"], "did-render");
    assert_eq!(events[0]["bucket"], events[1]["bucket"]);
    assert!(events[0]["bucket"].is_string());
}
